//! Property-based tests for the riskgate core invariants.
//!
//! Run with: cargo test --test property_tests

mod property;
