/// Trips and group membership
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TripError, UserId};

/// Descriptive trip header, written once at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripInfo {
    pub name: String,
    pub destination: String,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A shared trip: header plus the members allowed to see its documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub info: TripInfo,
    pub members: Vec<UserId>,
}

impl Trip {
    /// Create a trip; the creator becomes the first member.
    pub fn create(
        name: impl Into<String>,
        destination: impl Into<String>,
        created_by: UserId,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TripError::EmptyField("name"));
        }

        let destination = destination.into();
        let destination = if destination.trim().is_empty() {
            "Japón".to_string()
        } else {
            destination
        };

        Ok(Self {
            info: TripInfo {
                name,
                destination,
                date_start: None,
                date_end: None,
                created_by,
                created_at: Utc::now(),
            },
            members: vec![created_by],
        })
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.info.date_start = Some(start);
        self.info.date_end = Some(end);
        self
    }

    /// Add a member. Joining twice is a no-op.
    pub fn add_member(&mut self, user_id: UserId) -> bool {
        if self.members.contains(&user_id) {
            return false;
        }
        self.members.push(user_id);
        true
    }

    pub fn remove_member(&mut self, user_id: UserId) {
        self.members.retain(|m| *m != user_id);
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }
}
