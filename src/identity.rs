use std::fmt;

/// Leading marker every normalized handle carries (e.g. "@alice").
pub const HANDLE_MARKER: char = '@';

const SYSTEM_KEY: &str = "system";
const PEER_PREFIX: &str = "dm:";

/// Stable key for a conversation.
///
/// Either the singleton system conversation or a per-peer key derived from
/// the lower-cased normalized handle, so "Alice", "@alice" and " @@ALICE "
/// all land in the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn system() -> Self {
        Self(SYSTEM_KEY.to_string())
    }

    /// Derive the conversation for a peer handle. Blank handles have none.
    pub fn peer(raw_handle: &str) -> Option<Self> {
        let key = conversation_key(raw_handle);
        if key.is_empty() {
            return None;
        }
        Some(Self(format!("{}{}", PEER_PREFIX, key)))
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_KEY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical display form of a handle: trimmed, exactly one leading marker,
/// case preserved. Blank input yields an empty string.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let bare = trimmed.trim_start_matches(HANDLE_MARKER).trim_start();
    if bare.is_empty() {
        return String::new();
    }
    format!("{}{}", HANDLE_MARKER, bare)
}

/// Case-insensitive lookup key for a handle.
pub fn conversation_key(raw: &str) -> String {
    normalize(raw).to_lowercase()
}

/// True when both handles refer to the same account.
pub fn same_identity(a: &str, b: &str) -> bool {
    let key_a = conversation_key(a);
    !key_a.is_empty() && key_a == conversation_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_single_marker() {
        assert_eq!(normalize("alice"), "@alice");
        assert_eq!(normalize("@alice"), "@alice");
        assert_eq!(normalize("  @@Alice "), "@Alice");
    }

    #[test]
    fn test_normalize_blank_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("@"), "");
        assert_eq!(normalize(" @@ "), "");
    }

    #[test]
    fn test_peer_ids_are_case_insensitive() {
        let a = ConversationId::peer("Alice").unwrap();
        let b = ConversationId::peer("@ALICE").unwrap();
        let c = ConversationId::peer("  @alice").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "dm:@alice");
        assert!(!a.is_system());
    }

    #[test]
    fn test_blank_handle_has_no_conversation() {
        assert!(ConversationId::peer("  ").is_none());
        assert!(ConversationId::peer("@").is_none());
    }

    #[test]
    fn test_system_id_never_collides_with_peer() {
        let system = ConversationId::system();
        let peer = ConversationId::peer("system").unwrap();
        assert!(system.is_system());
        assert_ne!(system, peer);
    }

    #[test]
    fn test_same_identity() {
        assert!(same_identity("@Bob", "bob"));
        assert!(!same_identity("@bob", "@bobby"));
        assert!(!same_identity("", ""));
    }
}
