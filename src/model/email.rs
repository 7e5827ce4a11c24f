use regex::Regex;
use std::sync::LazyLock;

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Canonical form used for every invitation lookup and for persistence
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Cheap structural check (`local@domain.tld`); deliverability is the mail
/// channel's problem.
pub fn is_plausible_email(normalized: &str) -> bool {
    normalized.len() <= 254 && EMAIL_SHAPE.is_match(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM \n"), "alice@example.com");
    }

    #[test]
    fn rejects_obviously_broken_addresses() {
        assert!(is_plausible_email("a@b.com"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("not an email"));
        assert!(!is_plausible_email(""));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[ \\t]{0,3}[A-Za-z0-9._]{1,12}@[A-Za-z]{1,8}\\.[A-Za-z]{2,4}[ \\t]{0,3}") {
            let once = normalize_email(&raw);
            prop_assert_eq!(normalize_email(&once), once.clone());
            prop_assert!(is_plausible_email(&once));
        }
    }
}
