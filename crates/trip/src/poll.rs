/// Group polls. A poll is a single document mutated by concurrent voters,
/// so the write path uses the store's compare-and-set; the rules here are
/// pure and independent of storage.
use serde::{Deserialize, Serialize};

use crate::{Result, TripError, UserId};

/// One choice and the users who picked it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    pub votes: Vec<UserId>,
}

/// A question put to the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub question: String,
    pub options: Vec<PollOption>,
    pub created_by: UserId,
    pub created_by_name: String,
    pub active: bool,
}

impl Poll {
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        created_by: UserId,
        created_by_name: impl Into<String>,
    ) -> Result<Self> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(TripError::EmptyField("question"));
        }

        let options: Vec<PollOption> = options
            .into_iter()
            .filter(|o| !o.trim().is_empty())
            .map(|o| PollOption {
                text: o.trim().to_string(),
                votes: Vec::new(),
            })
            .collect();

        if options.len() < 2 {
            return Err(TripError::TooFewOptions);
        }

        Ok(Self {
            question: question.trim().to_string(),
            options,
            created_by,
            created_by_name: created_by_name.into(),
            active: true,
        })
    }

    /// Record a vote. Each user votes at most once, and votes are final
    /// while the poll is open.
    pub fn vote(&mut self, voter: UserId, option_index: usize) -> Result<()> {
        if !self.active {
            return Err(TripError::PollClosed);
        }
        if option_index >= self.options.len() {
            return Err(TripError::OptionOutOfRange(option_index));
        }
        if self.voter_option(voter).is_some() {
            return Err(TripError::AlreadyVoted);
        }

        self.options[option_index].votes.push(voter);
        Ok(())
    }

    /// Which option a user voted for, if any
    pub fn voter_option(&self, voter: UserId) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.votes.contains(&voter))
    }

    pub fn total_votes(&self) -> usize {
        self.options.iter().map(|o| o.votes.len()).sum()
    }

    /// Close the poll. Only its creator may.
    pub fn close(&mut self, requester: UserId) -> Result<()> {
        if requester != self.created_by {
            return Err(TripError::NotCreator);
        }
        self.active = false;
        Ok(())
    }
}
