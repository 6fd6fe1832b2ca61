//! Canonical conversation keys.
//!
//! A conversation between two users is identified by their ids sorted
//! byte-wise and joined with [`KEY_SEPARATOR`], so both sides of a pair
//! always land on the same key.

use super::ChatError;

pub const KEY_SEPARATOR: char = ':';

fn valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(KEY_SEPARATOR)
}

/// Key for the unordered pair `{a, b}`.
pub fn conversation_key(a: &str, b: &str) -> Result<String, ChatError> {
    if !valid_id(a) || !valid_id(b) || a == b {
        return Err(ChatError::InvalidParticipants);
    }

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    Ok(format!("{}{}{}", low, KEY_SEPARATOR, high))
}

/// Split a key back into its two participant ids.
pub fn participants(key: &str) -> Option<(&str, &str)> {
    let (low, high) = key.split_once(KEY_SEPARATOR)?;
    (valid_id(low) && valid_id(high) && low < high).then_some((low, high))
}

/// Whether `user_id` is one of the two participants of `key`.
pub fn involves(key: &str, user_id: &str) -> bool {
    participants(key).is_some_and(|(a, b)| a == user_id || b == user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent() {
        let pairs = [
            ("alice", "bob"),
            ("64f1c2", "64f1c1"),
            ("b2c1d2e0-1111-4a4a-9f9f-000000000001", "0e6c3a44-2222-4b4b-8a8a-000000000002"),
            ("Z", "a"),
        ];
        for (a, b) in pairs {
            assert_eq!(conversation_key(a, b).unwrap(), conversation_key(b, a).unwrap());
        }
    }

    #[test]
    fn test_self_chat_rejected() {
        assert!(matches!(
            conversation_key("alice", "alice"),
            Err(ChatError::InvalidParticipants)
        ));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        assert!(conversation_key("", "bob").is_err());
        assert!(conversation_key("al:ice", "bob").is_err());
    }

    #[test]
    fn test_participants_round_trip() {
        let key = conversation_key("bob", "alice").unwrap();
        assert_eq!(key, "alice:bob");
        assert_eq!(participants(&key), Some(("alice", "bob")));
        assert!(involves(&key, "bob"));
        assert!(!involves(&key, "carol"));
        assert_eq!(participants("bob:alice"), None);
        assert_eq!(participants("nokey"), None);
    }
}
