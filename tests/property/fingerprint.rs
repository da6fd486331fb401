//! Invariants of request fingerprinting:
//! - equivalent inputs (formatting, case) always share a key
//! - the key is always 64 lowercase hex characters

use proptest::prelude::*;
use riskgate_core::RequestIdentifiers;

fn phone_digits() -> impl Strategy<Value = String> {
    proptest::collection::vec(0u8..10, 10..=13)
        .prop_map(|digits| digits.into_iter().map(|d| (b'0' + d) as char).collect())
}

fn decorate_phone(digits: &str, seed: u64) -> String {
    let separators = [" ", "-", "", " ", "."];
    let mut out = String::new();
    if seed % 3 == 0 {
        out.push('+');
    }
    for (i, c) in digits.chars().enumerate() {
        out.push(c);
        if i % 3 == 2 {
            out.push_str(separators[(seed as usize + i) % separators.len()]);
        }
    }
    out
}

fn mixed_case(input: &str, seed: u64) -> String {
    input
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if (seed as usize + i) % 2 == 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn phone_formatting_never_changes_the_key(digits in phone_digits(), seed in any::<u64>()) {
        let plain = RequestIdentifiers {
            phone: Some(digits.clone()),
            ..Default::default()
        };
        let decorated = RequestIdentifiers {
            phone: Some(decorate_phone(&digits, seed)),
            ..Default::default()
        };
        prop_assert_eq!(plain.fingerprint(), decorated.fingerprint());
    }

    #[test]
    fn email_case_never_changes_the_key(
        local in "[a-z][a-z0-9.]{1,12}",
        domain in "[a-z]{2,10}",
        seed in any::<u64>(),
    ) {
        let email = format!("{local}@{domain}.com");
        let lower = RequestIdentifiers {
            email: Some(email.clone()),
            ..Default::default()
        };
        let shouty = RequestIdentifiers {
            email: Some(mixed_case(&email, seed)),
            ..Default::default()
        };
        prop_assert_eq!(lower.fingerprint(), shouty.fingerprint());
    }

    #[test]
    fn keys_are_64_lowercase_hex(
        digits in phone_digits(),
        order in "[A-Z]{2,6}-[0-9]{1,4}",
    ) {
        let key = RequestIdentifiers {
            phone: Some(digits),
            order_name: Some(order),
            ..Default::default()
        }
        .fingerprint();
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_last_ten_digits_mean_different_keys(digits in phone_digits()) {
        let mut other: Vec<char> = digits.chars().collect();
        let last = other.len() - 1;
        other[last] = if other[last] == '9' { '0' } else {
            char::from_digit(other[last].to_digit(10).unwrap() + 1, 10).unwrap()
        };
        let a = RequestIdentifiers { phone: Some(digits), ..Default::default() };
        let b = RequestIdentifiers {
            phone: Some(other.into_iter().collect()),
            ..Default::default()
        };
        prop_assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
