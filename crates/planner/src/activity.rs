/// Group activity feed. Logging is best-effort: a feed entry is never
/// worth failing the action that produced it.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use sync::{ChannelSlot, ErrorHandler, QueryHandler, QuerySpec, SafeStore, WriteMeta};
use trip::{ActivityEvent, ActivityKind};

use crate::{Result, Services};

const FEED_LIMIT: usize = 30;

#[derive(Debug, Clone)]
pub struct ActivityListing {
    pub id: String,
    pub event: ActivityEvent,
    pub at: Option<DateTime<Utc>>,
}

pub type ActivityHandler = Arc<dyn Fn(Vec<ActivityListing>) + Send + Sync>;

pub struct ActivityFeed {
    services: Services,
    safe: SafeStore,
    channel: ChannelSlot,
}

impl ActivityFeed {
    pub fn new(services: Services) -> Self {
        let safe = services.safe();
        Self {
            services,
            safe,
            channel: ChannelSlot::new(),
        }
    }

    /// Append an event to the active trip's feed. Outside a trip, or on
    /// any failure, this quietly does nothing.
    pub async fn log(&self, kind: ActivityKind, detail: impl Into<String>) {
        let Some(me) = self.services.identity.current() else {
            return;
        };
        let Some(trip_id) = self.services.active_trip.current() else {
            debug!("no active trip, skipping activity log");
            return;
        };

        let event = ActivityEvent::new(kind, me.id, me.name.clone(), detail);
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "activity event did not serialize");
                return;
            }
        };

        let collection = format!("trips/{trip_id}/activity");
        if let Err(err) = self
            .safe
            .add_doc_safe(&collection, payload, WriteMeta::by(me.id))
            .await
        {
            warn!(%err, "activity log write failed");
        }
    }

    /// Live view of the most recent events, newest first
    pub async fn watch_recent(&self, handler: ActivityHandler) -> Result<()> {
        let trip_id = self.services.require_trip()?;
        let spec =
            QuerySpec::collection(format!("trips/{trip_id}/activity")).limit(FEED_LIMIT);

        let on_change: QueryHandler = Arc::new(move |docs| {
            let listings = docs
                .into_iter()
                .filter_map(|snapshot| match snapshot.decode::<ActivityEvent>() {
                    Ok(event) => Some(ActivityListing {
                        id: snapshot.doc_id().to_string(),
                        event,
                        at: snapshot.created_at,
                    }),
                    Err(err) => {
                        warn!(path = %snapshot.path, %err, "activity event did not decode");
                        None
                    }
                })
                .collect();
            handler(listings);
        });
        let on_error: ErrorHandler = Arc::new(|err| {
            warn!(%err, "activity subscription error");
        });

        self.channel
            .replace_query(&self.services.store, &spec, on_change, on_error)
            .await?;
        Ok(())
    }

    pub fn stop(&self) {
        self.channel.clear();
    }
}
