//! Identifier syntax for bucket ids, object ids and url keys

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]+([-][a-z0-9]+)*[a-z]+$").expect("identifier pattern is valid")
});

/// Lowercase words joined by single dashes, at least two characters,
/// starting and ending with a letter
pub fn is_valid(id: &str) -> bool {
    IDENTIFIER.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts() {
        for id in ["ab", "photos", "team-photos", "build-2024-final", "a-b1c"] {
            assert!(is_valid(id), "{id}");
        }
    }

    #[test]
    fn test_rejects() {
        for id in ["", "a", "Photos", "-ab", "ab-", "a--b", "ab2", "a_b", "../ab", "a b"] {
            assert!(!is_valid(id), "{id}");
        }
    }
}
