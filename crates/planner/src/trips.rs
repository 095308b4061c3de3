/// Trip directory: creating, joining and selecting shared trips.
/// Trip headers live under `trips/<id>`; selecting a trip drives the
/// active-trip handle every other feature resolves its scope from, and is
/// remembered locally so a restart comes back to the same trip.
use std::sync::Arc;
use tracing::{info, warn};

use sync::{
    ChannelSlot, DocumentStore, ErrorHandler, QueryHandler, QuerySpec, SafeStore, WriteMeta,
};
use trip::{ActivityKind, Trip, TripId};

use crate::{ActivityFeed, PlannerError, Result, Services};

const TRIPS_COLLECTION: &str = "trips";
const SELECTED_TRIP_KEY: &str = "currentTripId";

/// A trip as listed for the current user
#[derive(Debug, Clone)]
pub struct TripListing {
    pub id: TripId,
    pub trip: Trip,
}

pub type TripsHandler = Arc<dyn Fn(Vec<TripListing>) + Send + Sync>;

pub struct TripDirectory {
    services: Services,
    safe: SafeStore,
    channel: ChannelSlot,
}

impl TripDirectory {
    pub fn new(services: Services) -> Self {
        let safe = services.safe();
        Self {
            services,
            safe,
            channel: ChannelSlot::new(),
        }
    }

    fn trip_path(trip_id: TripId) -> String {
        format!("{TRIPS_COLLECTION}/{trip_id}")
    }

    /// Create a trip and make it the active one
    pub async fn create_trip(
        &self,
        name: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<TripId> {
        let me = self.services.require_identity()?;
        let new_trip = Trip::create(name, destination, me.id)?;
        let trip_id = TripId::new();

        let payload = serde_json::to_value(&new_trip)
            .map_err(|e| sync::SyncError::Serialization(e.to_string()))?;
        self.safe
            .set_doc_safe(&Self::trip_path(trip_id), payload, WriteMeta::by(me.id))
            .await?;

        info!(%trip_id, name = %new_trip.info.name, "trip created");
        self.select_trip(trip_id);

        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::TripCreated, &new_trip.info.name)
            .await;

        Ok(trip_id)
    }

    /// Join an existing trip. Already being a member is fine.
    pub async fn join_trip(&self, trip_id: TripId) -> Result<()> {
        let me = self.services.require_identity()?;
        let path = Self::trip_path(trip_id);

        let snapshot = self
            .services
            .store
            .get(&path)
            .await
            .map_err(sync::SyncError::from)?;
        if !snapshot.exists {
            return Err(PlannerError::Sync(sync::SyncError::NotFound(path)));
        }

        let mut listed: Trip = snapshot.decode()?;
        if listed.add_member(me.id) {
            self.safe
                .update_doc_safe(
                    &path,
                    serde_json::json!({ "members": listed.members }),
                    WriteMeta::by(me.id),
                )
                .await?;
        }

        self.select_trip(trip_id);
        ActivityFeed::new(self.services.clone())
            .log(ActivityKind::MemberJoined, &me.name)
            .await;
        Ok(())
    }

    /// Trips where the current user is a member
    pub async fn my_trips(&self) -> Result<Vec<TripListing>> {
        let me = self.services.require_identity()?;

        let spec = QuerySpec::collection(TRIPS_COLLECTION)
            .where_array_contains("members", serde_json::json!(me.id));
        let read = self.safe.query_docs_safe(&spec, Vec::new()).await;

        Ok(decode_listings(read.value))
    }

    /// Live list of the user's trips
    pub async fn watch_my_trips(&self, handler: TripsHandler) -> Result<()> {
        let me = self.services.require_identity()?;

        let spec = QuerySpec::collection(TRIPS_COLLECTION)
            .where_array_contains("members", serde_json::json!(me.id));

        let on_change: QueryHandler = Arc::new(move |docs| {
            handler(decode_listings(docs));
        });
        let on_error: ErrorHandler = Arc::new(|err| {
            warn!(%err, "trips subscription error");
        });

        self.channel
            .replace_query(&self.services.store, &spec, on_change, on_error)
            .await?;
        Ok(())
    }

    /// Make a trip the active one and remember the choice locally
    pub fn select_trip(&self, trip_id: TripId) {
        self.services.active_trip.select(trip_id);
        self.services
            .fallback
            .set(SELECTED_TRIP_KEY, &trip_id.to_string());
        info!(%trip_id, "trip selected");
    }

    pub fn clear_selection(&self) {
        self.services.active_trip.clear();
        self.services.fallback.remove(SELECTED_TRIP_KEY);
    }

    /// Restore the trip selected in a previous session, if any
    pub fn restore_selection(&self) -> Option<TripId> {
        let raw = self.services.fallback.get(SELECTED_TRIP_KEY)?;
        match raw.parse::<uuid::Uuid>() {
            Ok(id) => {
                let trip_id = TripId(id);
                self.services.active_trip.select(trip_id);
                Some(trip_id)
            }
            Err(_) => {
                warn!("stored trip id unreadable, clearing it");
                self.services.fallback.remove(SELECTED_TRIP_KEY);
                None
            }
        }
    }

    pub fn stop(&self) {
        self.channel.clear();
    }
}

fn decode_listings(docs: Vec<sync::DocumentSnapshot>) -> Vec<TripListing> {
    docs.into_iter()
        .filter_map(|snapshot| {
            let id = snapshot.doc_id().parse::<uuid::Uuid>().ok()?;
            match snapshot.decode::<Trip>() {
                Ok(listed) => Some(TripListing {
                    id: TripId(id),
                    trip: listed,
                }),
                Err(err) => {
                    warn!(path = %snapshot.path, %err, "trip document did not decode");
                    None
                }
            }
        })
        .collect()
}
