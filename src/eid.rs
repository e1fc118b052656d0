use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt::Display, ops::Deref};

/// Length of the hex idempotency key used as a link id.
const LINK_KEY_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Eid(String);

impl Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for Eid {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Eid> for String {
    fn from(fr: Eid) -> Self {
        fr.0
    }
}

impl Eid {
    #[inline]
    pub fn new() -> Eid {
        Eid(rusty_ulid::generate_ulid_string())
    }

    /// Deterministic id for a (user, normalized url) pair.
    ///
    /// Two concurrent creates of the same url derive the same id, so the
    /// store rejects the second insert instead of storing a duplicate.
    pub fn link_key(uid: &str, normalized_url: &str) -> Eid {
        let digest = Sha256::new()
            .chain_update(uid.as_bytes())
            .chain_update(b"\n")
            .chain_update(normalized_url.as_bytes())
            .finalize();

        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        Eid(hex[..LINK_KEY_LEN].to_string())
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(Eid::new(), Eid::new());
        assert_eq!(Eid::new().len(), 26);
    }

    #[test]
    fn test_link_key_is_deterministic() {
        let a = Eid::link_key("alice", "https://example.com/a");
        let b = Eid::link_key("alice", "https://example.com/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), LINK_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_link_key_depends_on_user() {
        let a = Eid::link_key("alice", "https://example.com/a");
        let b = Eid::link_key("bob", "https://example.com/a");
        assert_ne!(a, b);
    }
}
