// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for mifit-fetch.

/// Mask a secret (password, app token, access code) for logging.
///
/// Shows only the first `visible_prefix` characters followed by "...".
/// Values no longer than the prefix are replaced entirely.
///
/// # Examples
///
/// ```
/// use mifit_fetch::utils::mask_sensitive;
///
/// assert_eq!(mask_sensitive("NQVBQFJyQktGHlp6QkpbRlpLRg", 6), "NQVBQF...");
/// assert_eq!(mask_sensitive("abc", 6), "***");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        return "***".to_string();
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("apptoken-secret123", 8), "apptoken...");
        assert_eq!(mask_sensitive("short", 8), "***");
        assert_eq!(mask_sensitive("", 8), "***");
    }

    #[test]
    fn test_mask_sensitive_multibyte() {
        assert_eq!(mask_sensitive("пароль-секрет", 3), "пар...");
    }
}
