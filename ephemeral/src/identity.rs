//! Template identity hashing
//!
//! A template database is shared by every engine that connects with the same
//! credentials and the same migration fingerprint, across processes and test
//! runs. Its name is therefore a pure function of those three values, hashed
//! with SHA-256 so it stays stable across builds and platforms.

use sha2::{Digest, Sha256};

/// Prefix of every template database name
pub const TEMPLATE_PREFIX: &str = "ephemeral_template_";

/// Hex characters of the digest kept in the template name
const DIGEST_CHARS: usize = 32;

/// Deterministic identity of a migrated template database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateIdentity {
    name: String,
}

impl TemplateIdentity {
    /// Derive the identity from connection credentials and a migration fingerprint
    ///
    /// # Example
    /// ```
    /// use ephemeral_pg::TemplateIdentity;
    ///
    /// let a = TemplateIdentity::derive("app", "secret", "v1");
    /// let b = TemplateIdentity::derive("app", "secret", "v1");
    /// let c = TemplateIdentity::derive("app", "secret", "v2");
    ///
    /// assert_eq!(a, b);
    /// assert_ne!(a.name(), c.name());
    /// ```
    pub fn derive(user: &str, secret: &str, fingerprint: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [user, secret, fingerprint] {
            // Length framing keeps ("ab", "c") and ("a", "bc") apart
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());

        Self {
            name: format!("{}{}", TEMPLATE_PREFIX, &digest[..DIGEST_CHARS]),
        }
    }

    /// Template database name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for TemplateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Numeric key of an advisory lock named `name`
pub fn lock_key(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn test_same_triple_same_name() {
        let a = TemplateIdentity::derive("user", "pass", "kv-1");
        let b = TemplateIdentity::derive("user", "pass", "kv-1");
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_any_component_changes_name() {
        let base = TemplateIdentity::derive("user", "pass", "kv-1");

        assert_ne!(base, TemplateIdentity::derive("other", "pass", "kv-1"));
        assert_ne!(base, TemplateIdentity::derive("user", "other", "kv-1"));
        assert_ne!(base, TemplateIdentity::derive("user", "pass", "kv-2"));
    }

    #[test]
    fn test_component_boundaries_are_framed() {
        assert_ne!(
            TemplateIdentity::derive("ab", "c", "x"),
            TemplateIdentity::derive("a", "bc", "x")
        );
        assert_ne!(
            TemplateIdentity::derive("", "pass", "x"),
            TemplateIdentity::derive("pass", "", "x")
        );
    }

    #[test]
    fn test_name_is_a_valid_identifier() {
        let identity = TemplateIdentity::derive("user", "pass", "fingerprint");
        let name = identity.name();

        assert!(name.starts_with(TEMPLATE_PREFIX));
        assert_eq!(name.len(), TEMPLATE_PREFIX.len() + DIGEST_CHARS);
        assert!(name.len() <= 63);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        assert_eq!(identity.to_string(), name);
    }

    #[test]
    fn test_lock_key_is_stable_and_distinct() {
        assert_eq!(lock_key("template_a"), lock_key("template_a"));
        assert_ne!(lock_key("template_a"), lock_key("template_b"));
    }
}
