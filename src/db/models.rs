use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest title derived from a first message, in characters.
pub const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub browser_fingerprint: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title for a chat whose first message is `content`.
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Chat {}", now.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_short_message_kept_whole() {
        let content = "Hello there, how are you today friend";
        assert_eq!(derive_title(content), content);
    }

    #[test]
    fn test_derive_title_exactly_fifty_chars_has_no_ellipsis() {
        let content = "a".repeat(50);
        assert_eq!(derive_title(&content), content);
    }

    #[test]
    fn test_derive_title_truncates_long_message() {
        let content = "abcdefghij".repeat(6);
        assert_eq!(content.chars().count(), 60);
        assert_eq!(derive_title(&content), format!("{}...", &content[..50]));
    }

    #[test]
    fn test_derive_title_counts_characters_not_bytes() {
        let content = "é".repeat(51);
        let title = derive_title(&content);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let message = Message {
            id: "m1".into(),
            chat_id: "c1".into(),
            role: Role::Assistant,
            content: "hi".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["chatId"], "c1");
        assert_eq!(json["role"], "assistant");
    }
}
