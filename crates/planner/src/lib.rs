/// Feature modules of the trip planner, built on the sync engine.
/// Every feature receives its collaborators (document store, fallback
/// store, identity provider, active-trip handle) through `Services` at
/// construction; nothing reaches into ambient globals.
use std::sync::Arc;
use thiserror::Error;

use sync::{
    ActiveTrip, DocumentStore, FallbackStore, IdentityProvider, SafeStore, ScopeResolver,
    StoreError, SyncError,
};
use trip::{Identity, TripId};

mod identity;
pub use identity::*;

mod trips;
pub use trips::*;

mod packing;
pub use packing::*;

mod favorites;
pub use favorites::*;

mod hotels;
pub use hotels::*;

mod chat;
pub use chat::*;

mod journal;
pub use journal::*;

mod polls;
pub use polls::*;

mod activity;
pub use activity::*;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Domain(#[from] trip::TripError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("sign in required")]
    SignedOut,

    #[error("no trip selected")]
    NoActiveTrip,
}

impl From<StoreError> for PlannerError {
    fn from(err: StoreError) -> Self {
        PlannerError::Sync(err.into())
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Injected collaborators shared by all features
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub fallback: Arc<dyn FallbackStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub active_trip: ActiveTrip,
}

impl Services {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        fallback: Arc<dyn FallbackStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            fallback,
            identity,
            active_trip: ActiveTrip::new(),
        }
    }

    pub fn resolver(&self) -> ScopeResolver {
        ScopeResolver::new(self.identity.clone(), self.active_trip.clone())
    }

    pub fn safe(&self) -> SafeStore {
        SafeStore::new(self.store.clone())
    }

    pub(crate) fn require_identity(&self) -> Result<Identity> {
        self.identity.current().ok_or(PlannerError::SignedOut)
    }

    pub(crate) fn require_trip(&self) -> Result<TripId> {
        self.active_trip.current().ok_or(PlannerError::NoActiveTrip)
    }
}
