//! Redaction of sensitive values in anything headed for a log line, an error
//! body, or an export.

use regex::Regex;
use std::sync::OnceLock;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+\-]+@([A-Za-z0-9.\-]+\.[A-Za-z]{2,})").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Seven or more digits, allowing common separators between them.
    RE.get_or_init(|| Regex::new(r"\+?\d(?:[ \-().]*\d){6,}").unwrap())
}

/// Replaces email local parts and phone-number-like digit runs with
/// `[REDACTED]`.
///
/// The domain of an email is kept (it is useful for error clustering and not
/// personally identifying on its own); the local part is not. Any run of
/// seven or more digits is treated as a phone number regardless of
/// formatting.
pub fn redact(input: &str) -> String {
    let pass = email_re().replace_all(input, "[REDACTED]@$1");
    phone_re().replace_all(&pass, "[REDACTED]").into_owned()
}

/// Returns true when a field key must have its value suppressed entirely.
pub fn is_sensitive_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k == "password" || k == "token" || k == "secret"
}
