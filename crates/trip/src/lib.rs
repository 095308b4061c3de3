/// Trip domain model: identities, trips and membership, and the shared
/// documents a travel group collaborates on (packing list, favorites,
/// hotels, chat, journal, polls).
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod documents;
pub use documents::*;

mod poll;
pub use poll::*;

mod stream;
pub use stream::*;

mod members;
pub use members::*;

mod poi;
pub use poi::*;

#[derive(Debug, Error)]
pub enum TripError {
    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("user already voted in this poll")]
    AlreadyVoted,

    #[error("poll is closed")]
    PollClosed,

    #[error("poll option out of range: {0}")]
    OptionOutOfRange(usize),

    #[error("poll needs at least two options")]
    TooFewOptions,

    #[error("only the creator may do this")]
    NotCreator,

    #[error("only the author may do this")]
    NotAuthor,

    #[error("item not found: {0}")]
    ItemNotFound(String),
}

pub type Result<T> = std::result::Result<T, TripError>;

/// User identifier, assigned by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Trip identifier shared by all members of a travel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripId(pub uuid::Uuid);

impl TripId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated identity as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
