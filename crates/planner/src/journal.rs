/// Collaborative travel journal: one entry per person per experience,
/// deletable only by its author.
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::warn;

use sync::{
    ChannelSlot, DocumentStore, ErrorHandler, QueryHandler, QuerySpec, SafeStore, WriteMeta,
};
use trip::{ActivityKind, JournalEntry};

use crate::{ActivityFeed, PlannerError, Result, Services};

#[derive(Debug, Clone)]
pub struct JournalListing {
    pub id: String,
    pub entry: JournalEntry,
    pub written_at: Option<DateTime<Utc>>,
}

pub type JournalHandler = Arc<dyn Fn(Vec<JournalListing>) + Send + Sync>;

pub struct JournalFeature {
    services: Services,
    safe: SafeStore,
    channel: ChannelSlot,
}

impl JournalFeature {
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
        Ok(format!("trips/{trip_id}/journal"))
    }

    pub async fn add_entry(&self, date: NaiveDate, content: &str) -> Result<String> {
        let me = self.services.require_identity()?;
        let entry = JournalEntry::new(me.id, me.name.clone(), date, content)?;
        let collection = self.collection()?;

        let payload = serde_json::to_value(&entry)
            .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
        let snapshot = self
            .safe
            .add_doc_safe(&collection, payload, WriteMeta::by(me.id))
            .await?;

        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::JournalWritten, date.to_string())
            .await;

        Ok(snapshot.doc_id().to_string())
    }

    /// Remove an entry; only its author may.
    pub async fn delete_entry(&self, entry_id: &str) -> Result<()> {
        let me = self.services.require_identity()?;
        let collection = self.collection()?;
        let path = format!("{collection}/{entry_id}");

        let snapshot = self
            .services
            .store
            .get(&path)
            .await
            .map_err(sync::SyncError::from)?;
        if !snapshot.exists {
            return Err(PlannerError::Sync(sync::SyncError::NotFound(path)));
        }

        let entry: JournalEntry = snapshot.decode()?;
        entry.authorize_delete(me.id)?;

        self.safe.delete_doc_safe(&path).await?;
        Ok(())
    }

    pub async fn watch_entries(&self, handler: JournalHandler) -> Result<()> {
        let collection = self.collection()?;
        let spec = QuerySpec::collection(collection);

        let on_change: QueryHandler = Arc::new(move |docs| {
            let listings = docs
                .into_iter()
                .filter_map(|snapshot| match snapshot.decode::<JournalEntry>() {
                    Ok(entry) => Some(JournalListing {
                        id: snapshot.doc_id().to_string(),
                        entry,
                        written_at: snapshot.created_at,
                    }),
                    Err(err) => {
                        warn!(path = %snapshot.path, %err, "journal entry did not decode");
                        None
                    }
                })
                .collect();
            handler(listings);
        });
        let on_error: ErrorHandler = Arc::new(|err| {
            warn!(%err, "journal subscription error");
        });

        self.channel
            .replace_query(&self.services.store, &spec, on_change, on_error)
            .await?;
        Ok(())
    }

    pub async fn reinitialize(&self, handler: JournalHandler) -> Result<()> {
        self.watch_entries(handler).await
    }

    pub fn stop(&self) {
        self.channel.clear();
    }
}
