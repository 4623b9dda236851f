//! Secret wrapper for API keys and other sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroized on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Parse a list of secrets from text, one per line or comma separated.
    ///
    /// Blank entries and lines starting with `#` are skipped. Order is kept,
    /// since callers identify each secret by its position.
    pub fn parse_list(raw: &str) -> Vec<Secret<String>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .flat_map(|line| line.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Secret::new(s.to_owned()))
            .collect()
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_debug_and_display() {
        let secret = Secret::new(String::from("AIzaSy-test-key"));
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn exposes_value() {
        let secret = Secret::new(String::from("AIzaSy-test-key"));
        assert_eq!(secret.expose(), "AIzaSy-test-key");
    }

    #[test]
    fn parse_list_keeps_order_and_skips_comments() {
        let raw = "# primary project\nkey-a\n\n  key-b  \n# key-disabled\nkey-c,key-d\n";
        let keys = Secret::parse_list(raw);
        let exposed: Vec<&str> = keys.iter().map(|k| k.expose().as_str()).collect();
        assert_eq!(exposed, vec!["key-a", "key-b", "key-c", "key-d"]);
    }

    #[test]
    fn parse_list_comma_separated_env_style() {
        let keys = Secret::parse_list("k1, k2,,k3");
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[2].expose(), "k3");
    }

    #[test]
    fn parse_list_empty_input() {
        assert!(Secret::parse_list("  \n # nothing\n").is_empty());
    }
}
