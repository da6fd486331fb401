//! Deterministic request fingerprinting.
//!
//! The same customer can reach the service through several identifier
//! combinations and formats (`"+92 300 123 4567"` vs `"03001234567"`,
//! upper/lower-cased emails, reordered parameters). The fingerprint collapses
//! all equivalent forms onto one 64-hex SHA-256 key so the deduplicator and
//! the cache agree on identity.

use crate::RiskError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw identifiers as they arrive from the loader surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentifiers {
    /// Customer phone number, any formatting.
    pub phone: Option<String>,
    /// Customer email address.
    pub email: Option<String>,
    /// Platform order id, case significant.
    pub order_id: Option<String>,
    /// Checkout token, case insignificant.
    pub checkout_token: Option<String>,
    /// Human-facing order name (e.g. `"ORDER-1"`), case significant.
    pub order_name: Option<String>,
}

/// Identifiers after normalization, ready for keying and store lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedIdentifiers {
    /// Last ten digits of the phone number; `None` when absent or too short.
    pub phone: Option<String>,
    /// Trimmed, lowercased email.
    pub email: Option<String>,
    /// Trimmed order id, case preserved.
    pub order_id: Option<String>,
    /// Trimmed, lowercased checkout token.
    pub checkout_token: Option<String>,
    /// Trimmed order name, case preserved.
    pub order_name: Option<String>,
}

impl NormalizedIdentifiers {
    /// True when no identifier survived normalization.
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.email.is_none()
            && self.order_id.is_none()
            && self.checkout_token.is_none()
            && self.order_name.is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Digits-only form of a phone number, anchored to the last ten digits.
/// Returns `None` for inputs with fewer than ten digits.
fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    Some(digits[digits.len() - 10..].to_string())
}

impl RequestIdentifiers {
    /// Applies the normalization rules to every field.
    pub fn normalized(&self) -> NormalizedIdentifiers {
        NormalizedIdentifiers {
            phone: non_empty(&self.phone).and_then(normalize_phone),
            email: non_empty(&self.email).map(|e| e.to_lowercase()),
            order_id: non_empty(&self.order_id).map(str::to_string),
            checkout_token: non_empty(&self.checkout_token).map(|t| t.to_lowercase()),
            order_name: non_empty(&self.order_name).map(str::to_string),
        }
    }

    /// The deterministic 64-hex key for this request.
    ///
    /// Fields are folded in a fixed order, so two parameter maps that differ
    /// only in ordering, case of case-insensitive fields, or phone formatting
    /// hash identically. Missing fields contribute the empty string.
    pub fn fingerprint(&self) -> String {
        let n = self.normalized();
        let canonical = format!(
            "phone={}|email={}|orderId={}|checkoutToken={}|orderName={}",
            n.phone.as_deref().unwrap_or(""),
            n.email.as_deref().unwrap_or(""),
            n.order_id.as_deref().unwrap_or(""),
            n.checkout_token.as_deref().unwrap_or(""),
            n.order_name.as_deref().unwrap_or(""),
        );
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }

    /// Validates the raw input before any subsystem touches it.
    ///
    /// Rules:
    /// - at least one identifier must be usable after normalization;
    /// - a present phone number must carry at least ten digits;
    /// - a present email must contain `@`.
    pub fn validate(&self) -> Result<NormalizedIdentifiers, RiskError> {
        if let Some(raw) = non_empty(&self.phone) {
            if normalize_phone(raw).is_none() {
                return Err(RiskError::validation(
                    "phone number must contain at least 10 digits",
                )
                .with_context("field", "phone"));
            }
        }
        if let Some(raw) = non_empty(&self.email) {
            if !raw.contains('@') {
                return Err(RiskError::validation("email address is malformed")
                    .with_context("field", "email"));
            }
        }
        let normalized = self.normalized();
        if normalized.is_empty() {
            return Err(RiskError::validation(
                "at least one customer identifier is required",
            ));
        }
        Ok(normalized)
    }
}

/// Short stable hash for parameter sets (16 hex chars of SHA-256). Used to
/// label query metrics without retaining the parameters themselves.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Full 64-hex SHA-256 of a single normalized identifier, matching the form
/// the data store keeps for phone and email columns.
pub fn hash_identifier(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
