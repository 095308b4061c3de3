/// Group polls. Votes are a read-modify-write on one shared document, so
/// the write uses revision compare-and-set: two racing voters both land,
/// and rule violations (voting twice, voting on a closed poll) surface
/// instead of silently overwriting each other.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use sync::{
    ChannelSlot, DocumentStore, ErrorHandler, QueryHandler, QuerySpec, SafeStore, StoreError,
    WriteMeta,
};
use trip::{ActivityKind, Poll, TripError};

use crate::{ActivityFeed, PlannerError, Result, Services};

/// How many times a vote re-reads and retries after losing a CAS race
const VOTE_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PollListing {
    pub id: String,
    pub poll: Poll,
    pub created_at: Option<DateTime<Utc>>,
}

pub type PollsHandler = Arc<dyn Fn(Vec<PollListing>) + Send + Sync>;

pub struct PollsFeature {
    services: Services,
    safe: SafeStore,
    channel: ChannelSlot,
}

impl PollsFeature {
    pub fn new(services: Services) -> Self {
        let safe = services.safe();
        Self {
            services,
            safe,
            channel: ChannelSlot::new(),
        }
    }

    fn collection(&self) -> Result<String> {
        let trip_id = self.services.require_trip()?;
        Ok(format!("trips/{trip_id}/polls"))
    }

    pub async fn create_poll(&self, question: &str, options: Vec<String>) -> Result<String> {
        let me = self.services.require_identity()?;
        let poll = Poll::new(question, options, me.id, me.name.clone())?;
        let collection = self.collection()?;

        let payload = serde_json::to_value(&poll)
            .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
        let snapshot = self
            .safe
            .add_doc_safe(&collection, payload, WriteMeta::by(me.id))
            .await?;

        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::PollCreated, &poll.question)
            .await;

        Ok(snapshot.doc_id().to_string())
    }

    /// Cast a vote. Re-reads and retries on a lost revision race; rule
    /// violations (already voted, closed poll) come back as domain errors.
    pub async fn vote(&self, poll_id: &str, option_index: usize) -> Result<()> {
        let me = self.services.require_identity()?;
        let collection = self.collection()?;
        let path = format!("{collection}/{poll_id}");

        for attempt in 0..VOTE_RETRIES {
            let snapshot = self
                .services
                .store
                .get(&path)
                .await
                .map_err(sync::SyncError::from)?;
            if !snapshot.exists {
                return Err(PlannerError::Sync(sync::SyncError::NotFound(path)));
            }

            let mut poll: Poll = snapshot.decode()?;
            poll.vote(me.id, option_index)?;

            let payload = serde_json::to_value(&poll)
                .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
            let meta = WriteMeta::by(me.id).expecting(snapshot.revision);

            match self.services.store.set(&path, payload, meta).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict { .. }) if attempt + 1 < VOTE_RETRIES => {
                    // Someone else voted in between; re-read and try again
                    warn!(path, attempt = attempt + 1, "vote lost a write race");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(PlannerError::Sync(sync::SyncError::Transient(
            "vote kept losing write races".into(),
        )))
    }

    /// Close a poll; only its creator may.
    pub async fn close_poll(&self, poll_id: &str) -> Result<()> {
        let me = self.services.require_identity()?;
        let collection = self.collection()?;
        let path = format!("{collection}/{poll_id}");

        let snapshot = self
            .services
            .store
            .get(&path)
            .await
            .map_err(sync::SyncError::from)?;
        if !snapshot.exists {
            return Err(PlannerError::Sync(sync::SyncError::NotFound(path)));
        }

        let mut poll: Poll = snapshot.decode()?;
        poll.close(me.id)?;

        let payload = serde_json::to_value(&poll)
            .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
        self.safe
            .set_doc_safe(&path, payload, WriteMeta::by(me.id).expecting(snapshot.revision))
            .await?;

        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::PollClosed, &poll.question)
            .await;
        Ok(())
    }

    /// Live view of the open polls, newest first
    pub async fn watch_active_polls(&self, handler: PollsHandler) -> Result<()> {
        let collection = self.collection()?;
        let spec =
            QuerySpec::collection(collection).where_eq("active", serde_json::json!(true));

        let on_change: QueryHandler = Arc::new(move |docs| {
            let listings = docs
                .into_iter()
                .filter_map(|snapshot| match snapshot.decode::<Poll>() {
                    Ok(poll) => Some(PollListing {
                        id: snapshot.doc_id().to_string(),
                        poll,
                        created_at: snapshot.created_at,
                    }),
                    Err(err) => {
                        warn!(path = %snapshot.path, %err, "poll did not decode");
                        None
                    }
                })
                .collect();
            handler(listings);
        });
        let on_error: ErrorHandler = Arc::new(|err| {
            warn!(%err, "polls subscription error");
        });

        self.channel
            .replace_query(&self.services.store, &spec, on_change, on_error)
            .await?;
        Ok(())
    }

    pub async fn reinitialize(&self, handler: PollsHandler) -> Result<()> {
        self.watch_active_polls(handler).await
    }

    pub fn stop(&self) {
        self.channel.clear();
    }
}

/// True when an error is the domain-level "already voted" rejection
pub fn is_already_voted(err: &PlannerError) -> bool {
    matches!(err, PlannerError::Domain(TripError::AlreadyVoted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use sync::{DocumentStore, MemoryFallback, MemoryStore};
    use trip::{Identity, TripId, UserId};

    use crate::FixedIdentity;

    fn polls_for(
        store: Arc<MemoryStore>,
        identity: Identity,
        trip_id: TripId,
    ) -> PollsFeature {
        let services = Services::new(
            store,
            Arc::new(MemoryFallback::new()),
            Arc::new(FixedIdentity(identity)),
        );
        services.active_trip.select(trip_id);
        PollsFeature::new(services)
    }

    #[tokio::test]
    async fn test_vote_exclusivity_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let me = Identity::new(UserId::new(), "Noelia");
        let polls = polls_for(store.clone(), me.clone(), trip_id);

        let poll_id = polls
            .create_poll("¿Dónde cenamos?", vec!["Sushi".into(), "Ramen".into()])
            .await
            .unwrap();

        polls.vote(&poll_id, 0).await.unwrap();

        let second = polls.vote(&poll_id, 1).await;
        assert!(second.is_err());
        assert!(is_already_voted(&second.unwrap_err()));

        // The stored poll shows the vote in option 0 only
        let path = format!("trips/{trip_id}/polls/{poll_id}");
        let stored: Poll = store.get(&path).await.unwrap().decode().unwrap();
        assert_eq!(stored.options[0].votes, vec![me.id]);
        assert!(stored.options[1].votes.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_voters_both_land() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let creator = polls_for(store.clone(), Identity::new(UserId::new(), "Noelia"), trip_id);

        let poll_id = creator
            .create_poll("¿Dónde cenamos?", vec!["Sushi".into(), "Ramen".into()])
            .await
            .unwrap();

        let voter_a = polls_for(store.clone(), Identity::new(UserId::new(), "Aki"), trip_id);
        let voter_b = polls_for(store.clone(), Identity::new(UserId::new(), "Sam"), trip_id);

        let (a, b) = tokio::join!(voter_a.vote(&poll_id, 0), voter_b.vote(&poll_id, 1));
        a.unwrap();
        b.unwrap();

        let path = format!("trips/{trip_id}/polls/{poll_id}");
        let stored: Poll = store.get(&path).await.unwrap().decode().unwrap();
        assert_eq!(stored.total_votes(), 2);
        assert_eq!(stored.options[0].votes.len(), 1);
        assert_eq!(stored.options[1].votes.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_poll_leaves_active_view() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let creator = Identity::new(UserId::new(), "Noelia");
        let polls = polls_for(store.clone(), creator, trip_id);

        let keep = polls
            .create_poll("¿Onsen o karaoke?", vec!["Onsen".into(), "Karaoke".into()])
            .await
            .unwrap();
        let close = polls
            .create_poll("¿Dónde cenamos?", vec!["Sushi".into(), "Ramen".into()])
            .await
            .unwrap();

        let seen: Arc<Mutex<Vec<PollListing>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: PollsHandler = {
            let seen = seen.clone();
            Arc::new(move |listings| {
                *seen.lock() = listings;
            })
        };
        polls.watch_active_polls(handler).await.unwrap();
        assert_eq!(seen.lock().len(), 2);

        polls.close_poll(&close).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let listings = seen.lock();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, keep);
    }

    #[tokio::test]
    async fn test_only_creator_closes() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let creator = polls_for(store.clone(), Identity::new(UserId::new(), "Noelia"), trip_id);
        let poll_id = creator
            .create_poll("¿Dónde cenamos?", vec!["Sushi".into(), "Ramen".into()])
            .await
            .unwrap();

        let member = polls_for(store, Identity::new(UserId::new(), "Aki"), trip_id);
        let result = member.close_poll(&poll_id).await;
        assert!(matches!(
            result,
            Err(PlannerError::Domain(TripError::NotCreator))
        ));
    }
}
