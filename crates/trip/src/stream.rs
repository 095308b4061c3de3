/// Append-only stream entries: chat messages, journal entries and the
/// activity feed. Entries are immutable once created; display order comes
/// from the store's server-assigned timestamp, never from client clocks.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Result, TripError, UserId};

/// One chat message inside a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author_id: UserId,
    pub author_name: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(author_id: UserId, author_name: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TripError::EmptyField("text"));
        }

        Ok(Self {
            author_id,
            author_name: author_name.into(),
            text,
        })
    }
}

/// A diary entry for one day of the trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub author_id: UserId,
    pub author_name: String,
    pub date: NaiveDate,
    pub content: String,
}

impl JournalEntry {
    pub fn new(
        author_id: UserId,
        author_name: impl Into<String>,
        date: NaiveDate,
        content: impl Into<String>,
    ) -> Result<Self> {
        let content = content.into();
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(TripError::EmptyField("content"));
        }

        Ok(Self {
            author_id,
            author_name: author_name.into(),
            date,
            content,
        })
    }

    /// Entries may only be removed by whoever wrote them.
    pub fn authorize_delete(&self, requester: UserId) -> Result<()> {
        if self.author_id != requester {
            return Err(TripError::NotAuthor);
        }
        Ok(())
    }
}

/// What kind of thing happened, for the group's activity timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TripCreated,
    MemberJoined,
    PollCreated,
    PollClosed,
    HotelAdded,
    JournalWritten,
}

/// One row in the activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub actor_id: UserId,
    pub actor_name: String,
    pub detail: String,
}

impl ActivityEvent {
    pub fn new(
        kind: ActivityKind,
        actor_id: UserId,
        actor_name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            actor_id,
            actor_name: actor_name.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_is_trimmed() {
        let msg = ChatMessage::new(UserId::new(), "Noelia", "  hola!  ").unwrap();
        assert_eq!(msg.text, "hola!");
    }

    #[test]
    fn test_empty_message_rejected() {
        let result = ChatMessage::new(UserId::new(), "Noelia", "   ");
        assert!(matches!(result, Err(TripError::EmptyField("text"))));
    }

    #[test]
    fn test_journal_delete_is_author_only() {
        let author = UserId::new();
        let entry = JournalEntry::new(
            author,
            "Noelia",
            NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            "Sensō-ji al amanecer, sin gente.",
        )
        .unwrap();

        assert!(entry.authorize_delete(author).is_ok());
        assert!(matches!(
            entry.authorize_delete(UserId::new()),
            Err(TripError::NotAuthor)
        ));
    }
}
