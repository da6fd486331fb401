//! End-to-end scenarios through the assembled assessment pipeline.
//!
//! Run with: cargo test --test pipeline_scenarios

mod scenarios;
