//! Message record exchanged between clients and the server.
//!
//! One record is one line on the wire. Records carry no identifier and no
//! timestamp; clients stamp them locally on receipt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username substituted when a received record has no `username` field.
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Username used when the user accepts the prompt default.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Maximum username length in characters, after trimming.
pub const MAX_USERNAME_CHARS: usize = 20;

/// Errors raised when building records from user input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// Username is empty or longer than [`MAX_USERNAME_CHARS`] after trim
    #[error("Username must be 1-{MAX_USERNAME_CHARS} characters long (got {0} characters)")]
    InvalidUsername(usize),
}

/// A single chat message as it travels on the wire.
///
/// Unknown fields are ignored on decode. A missing `username` decodes as
/// [`UNKNOWN_USERNAME`] and a missing `text` as the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "unknown_username")]
    username: String,
    #[serde(default)]
    text: String,
}

fn unknown_username() -> String {
    UNKNOWN_USERNAME.to_string()
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Announcement sent by a client right after it connects.
    pub fn joined(username: &str) -> Self {
        Self::new(username, format!("{} joined the chat!", username))
    }

    /// Farewell sent by a client before it leaves.
    pub fn left(username: &str) -> Self {
        Self::new(username, format!("{} left the chat!", username))
    }
}

/// Validate a username typed by a user.
///
/// Returns the trimmed username when it is 1 to [`MAX_USERNAME_CHARS`]
/// characters long.
pub fn validate_username(raw: &str) -> Result<String, MessageError> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_USERNAME_CHARS {
        return Err(MessageError::InvalidUsername(chars));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_defaulted() {
        // テスト項目: username / text が欠けていてもエラーにならず既定値になる
        // given (前提条件):
        let json = r#"{}"#;

        // when (操作):
        let message: ChatMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(message.username(), UNKNOWN_USERNAME);
        assert_eq!(message.text(), "");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        // テスト項目: 未知のフィールドは無視される
        // given (前提条件):
        let json = r#"{"username":"alice","text":"hi","color":"red","ts":1}"#;

        // when (操作):
        let message: ChatMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(message, ChatMessage::new("alice", "hi"));
    }

    #[test]
    fn test_serialized_form_is_compact() {
        // テスト項目: シリアライズ結果は空白を含まないコンパクトな JSON になる
        // given (前提条件):
        let message = ChatMessage::new("alice", "hi");

        // when (操作):
        let json = serde_json::to_string(&message).unwrap();

        // then (期待する結果):
        assert_eq!(json, r#"{"username":"alice","text":"hi"}"#);
    }

    #[test]
    fn test_joined_and_left_announcements() {
        // テスト項目: 入室・退室メッセージの本文
        // given (前提条件):
        let name = "bob";

        // when (操作):
        let joined = ChatMessage::joined(name);
        let left = ChatMessage::left(name);

        // then (期待する結果):
        assert_eq!(joined.text(), "bob joined the chat!");
        assert_eq!(left.text(), "bob left the chat!");
        assert_eq!(left.username(), "bob");
    }

    #[test]
    fn test_validate_username_trims() {
        // テスト項目: 前後の空白は除去されて検証される
        // given (前提条件):
        let raw = "  alice \t";

        // when (操作):
        let result = validate_username(raw);

        // then (期待する結果):
        assert_eq!(result, Ok("alice".to_string()));
    }

    #[test]
    fn test_validate_username_rejects_empty_and_too_long() {
        // テスト項目: 空、または 21 文字以上のユーザー名は拒否される
        // given (前提条件):
        let empty = "   ";
        let too_long = "a".repeat(MAX_USERNAME_CHARS + 1);
        let longest = "あ".repeat(MAX_USERNAME_CHARS);

        // when (操作) / then (期待する結果):
        assert_eq!(
            validate_username(empty),
            Err(MessageError::InvalidUsername(0))
        );
        assert_eq!(
            validate_username(&too_long),
            Err(MessageError::InvalidUsername(21))
        );
        // 文字数はバイト数ではなく文字単位で数える
        assert!(validate_username(&longest).is_ok());
    }
}
