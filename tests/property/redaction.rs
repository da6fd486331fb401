//! Redaction invariants over serialized errors and log records:
//! no phone-length digit run and no email local part ever survives.

use proptest::prelude::*;
use riskgate_core::{redact, RiskError};
use riskgate_observe::LogBuffer;

fn has_long_digit_run(s: &str) -> bool {
    let mut run = 0usize;
    for c in s.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 7 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

proptest! {
    #[test]
    fn redact_removes_long_digit_runs(
        prefix in "[a-z ]{0,20}",
        digits in proptest::collection::vec(0u8..10, 7..=14),
        suffix in "[a-z ]{0,20}",
    ) {
        let number: String = digits.into_iter().map(|d| (b'0' + d) as char).collect();
        let input = format!("{prefix}{number}{suffix}");
        prop_assert!(!has_long_digit_run(&redact(&input)));
    }

    #[test]
    fn redact_removes_email_local_parts(
        local in "[a-z][a-z0-9.]{1,12}",
        domain in "[a-z]{2,10}",
    ) {
        let input = format!("customer {local}@{domain}.com complained");
        let output = redact(&input);
        let local_prefix = format!("{local}@");
        let still_has_local = output.contains(&local_prefix);
        prop_assert!(!still_has_local);
    }

    #[test]
    fn serialized_errors_are_always_clean(
        digits in proptest::collection::vec(0u8..10, 10..=12),
        local in "[a-z][a-z0-9]{2,10}",
    ) {
        let phone: String = digits.into_iter().map(|d| (b'0' + d) as char).collect();
        let err = RiskError::database(format!("lookup for {local}@example.com failed"))
            .with_context("phone", phone.clone())
            .with_context("secret", "hunter2");
        let json = serde_json::to_string(&err).unwrap();
        let local_prefix = format!("{local}@");
        let still_has_local = json.contains(&local_prefix);
        prop_assert!(!json.contains(&phone));
        prop_assert!(!still_has_local);
        prop_assert!(!json.contains("hunter2"));
    }

    #[test]
    fn log_records_are_redacted_at_write_time(
        digits in proptest::collection::vec(0u8..10, 10..=12),
    ) {
        let phone: String = digits.into_iter().map(|d| (b'0' + d) as char).collect();
        let buffer = LogBuffer::new(8);
        buffer.warn("lookup", None, &format!("no match for {phone}"));
        let record = &buffer.all()[0];
        prop_assert!(!record.message.contains(&phone));
    }
}
