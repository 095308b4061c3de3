/// Trip chat: an append-only message stream in collaborative scope.
/// Display order comes from the store's timestamps, newest first, capped
/// at the last 50 messages.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use sync::{ChannelSlot, ErrorHandler, QueryHandler, QuerySpec, SafeStore, WriteMeta};
use trip::ChatMessage;

use crate::{Result, Services};

const MESSAGE_LIMIT: usize = 50;

/// A message as delivered, with its stream id and server timestamp
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub id: String,
    pub message: ChatMessage,
    pub sent_at: Option<DateTime<Utc>>,
}

pub type MessagesHandler = Arc<dyn Fn(Vec<ChatEntry>) + Send + Sync>;

pub struct ChatFeature {
    services: Services,
    safe: SafeStore,
    channel: ChannelSlot,
}

impl ChatFeature {
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
        Ok(format!("trips/{trip_id}/chat"))
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        let me = self.services.require_identity()?;
        let message = ChatMessage::new(me.id, me.name.clone(), text)?;
        let collection = self.collection()?;

        let payload = serde_json::to_value(&message)
            .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
        self.safe
            .add_doc_safe(&collection, payload, WriteMeta::by(me.id))
            .await?;
        Ok(())
    }

    /// Subscribe to the latest messages of the active trip. Re-invoking
    /// after a trip switch replaces the previous channel.
    pub async fn watch_messages(&self, handler: MessagesHandler) -> Result<()> {
        let collection = self.collection()?;
        let spec = QuerySpec::collection(collection).limit(MESSAGE_LIMIT);

        let on_change: QueryHandler = Arc::new(move |docs| {
            let entries = docs
                .into_iter()
                .filter_map(|snapshot| match snapshot.decode::<ChatMessage>() {
                    Ok(message) => Some(ChatEntry {
                        id: snapshot.doc_id().to_string(),
                        message,
                        sent_at: snapshot.created_at,
                    }),
                    Err(err) => {
                        warn!(path = %snapshot.path, %err, "chat message did not decode");
                        None
                    }
                })
                .collect();
            handler(entries);
        });
        let on_error: ErrorHandler = Arc::new(|err| {
            warn!(%err, "chat subscription error");
        });

        self.channel
            .replace_query(&self.services.store, &spec, on_change, on_error)
            .await?;
        Ok(())
    }

    /// Trip switched: point the single chat channel at the new trip
    pub async fn reinitialize(&self, handler: MessagesHandler) -> Result<()> {
        self.watch_messages(handler).await
    }

    pub fn stop(&self) {
        self.channel.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use sync::{MemoryFallback, MemoryStore};
    use trip::{Identity, TripId, UserId};

    use crate::{FixedIdentity, PlannerError};

    fn chat_for(store: Arc<MemoryStore>, name: &str, trip_id: TripId) -> ChatFeature {
        let services = Services::new(
            store,
            Arc::new(MemoryFallback::new()),
            Arc::new(FixedIdentity(Identity::new(UserId::new(), name))),
        );
        services.active_trip.select(trip_id);
        ChatFeature::new(services)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_messages_arrive_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let alice = chat_for(store.clone(), "Noelia", trip_id);
        let bob = chat_for(store, "Aki", trip_id);

        let seen: Arc<Mutex<Vec<ChatEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let handler: MessagesHandler = {
            let seen = seen.clone();
            Arc::new(move |entries| {
                *seen.lock() = entries;
            })
        };
        bob.watch_messages(handler).await.unwrap();

        alice.send_message("¿ya reservaste el ryokan?").await.unwrap();
        alice.send_message("yo llevo el JR Pass").await.unwrap();
        settle().await;

        let entries = seen.lock();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message.text, "yo llevo el JR Pass");
        assert_eq!(entries[1].message.text, "¿ya reservaste el ryokan?");
        assert!(entries[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_io() {
        let store = Arc::new(MemoryStore::new());
        let trip_id = TripId::new();
        let chat = chat_for(store.clone(), "Noelia", trip_id);

        let result = chat.send_message("   ").await;
        assert!(matches!(result, Err(PlannerError::Domain(_))));
        assert_eq!(store.doc_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_requires_active_trip() {
        let services = Services::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryFallback::new()),
            Arc::new(FixedIdentity(Identity::new(UserId::new(), "Noelia"))),
        );
        let chat = ChatFeature::new(services);

        let result = chat.send_message("hola").await;
        assert!(matches!(result, Err(PlannerError::NoActiveTrip)));
    }

    #[tokio::test]
    async fn test_trip_switch_replaces_channel() {
        let store = Arc::new(MemoryStore::new());
        let trip_a = TripId::new();
        let trip_b = TripId::new();

        let services = Services::new(
            store.clone(),
            Arc::new(MemoryFallback::new()),
            Arc::new(FixedIdentity(Identity::new(UserId::new(), "Noelia"))),
        );
        services.active_trip.select(trip_a);
        let chat = ChatFeature::new(services.clone());

        let from_a = Arc::new(Mutex::new(0usize));
        let handler: MessagesHandler = {
            let from_a = from_a.clone();
            Arc::new(move |_entries| {
                *from_a.lock() += 1;
            })
        };
        chat.watch_messages(handler).await.unwrap();

        services.active_trip.select(trip_b);
        let from_b = Arc::new(Mutex::new(0usize));
        let handler: MessagesHandler = {
            let from_b = from_b.clone();
            Arc::new(move |_entries| {
                *from_b.lock() += 1;
            })
        };
        chat.reinitialize(handler).await.unwrap();

        let count_a = *from_a.lock();
        let writer = chat_for(store, "Aki", trip_a);
        writer.send_message("mensaje al viaje viejo").await.unwrap();
        settle().await;

        // The old trip's channel is gone; only trip B's handler is live
        assert_eq!(*from_a.lock(), count_a);
    }
}
