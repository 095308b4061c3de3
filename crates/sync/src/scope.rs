/// Scope resolution: whose data a document belongs to.
/// A document is either individual (keyed by user), collaborative (keyed
/// by the active trip) or ephemeral (local-only, never synced).
use std::sync::Arc;
use tokio::sync::watch;
use trip::{Identity, TripId, UserId};

/// Supplies the ambient identity, or None when signed out
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;
}

/// Shared handle to the currently selected trip.
/// Features subscribe to be told when the active trip changes.
#[derive(Clone)]
pub struct ActiveTrip {
    tx: Arc<watch::Sender<Option<TripId>>>,
}

impl ActiveTrip {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn select(&self, trip_id: TripId) {
        let _ = self.tx.send(Some(trip_id));
    }

    pub fn clear(&self) {
        let _ = self.tx.send(None);
    }

    pub fn current(&self) -> Option<TripId> {
        *self.tx.borrow()
    }

    /// Receiver that yields on every trip switch
    pub fn subscribe(&self) -> watch::Receiver<Option<TripId>> {
        self.tx.subscribe()
    }
}

impl Default for ActiveTrip {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved owner of a piece of shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Individual(UserId),
    Collaborative(TripId),
    Ephemeral,
}

impl Scope {
    /// Storage path for a named document in this scope.
    /// Ephemeral state has no remote path.
    pub fn document_path(&self, doc: &str) -> Option<String> {
        match self {
            Scope::Individual(user_id) => Some(format!("users/{user_id}/data/{doc}")),
            Scope::Collaborative(trip_id) => Some(format!("trips/{trip_id}/data/{doc}")),
            Scope::Ephemeral => None,
        }
    }

    /// Storage path for a named collection. Streams (chat, polls, journal)
    /// only exist in collaborative scope.
    pub fn collection_path(&self, collection: &str) -> Option<String> {
        match self {
            Scope::Collaborative(trip_id) => Some(format!("trips/{trip_id}/{collection}")),
            _ => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Scope::Ephemeral)
    }
}

/// Derives the scope from ambient identity and the active trip.
/// Callers must not cache the result across login/logout or trip switches;
/// resolve again on every (re-)initialization.
#[derive(Clone)]
pub struct ScopeResolver {
    identity: Arc<dyn IdentityProvider>,
    active_trip: ActiveTrip,
}

impl ScopeResolver {
    pub fn new(identity: Arc<dyn IdentityProvider>, active_trip: ActiveTrip) -> Self {
        Self {
            identity,
            active_trip,
        }
    }

    /// An active trip always wins over individual scope. This deliberately
    /// switches the visible dataset when a trip is joined; individual data
    /// stays stored but is not merged.
    pub fn resolve(&self) -> Scope {
        let Some(identity) = self.identity.current() else {
            return Scope::Ephemeral;
        };

        match self.active_trip.current() {
            Some(trip_id) => Scope::Collaborative(trip_id),
            None => Scope::Individual(identity.id),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.current()
    }

    pub fn active_trip(&self) -> &ActiveTrip {
        &self.active_trip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SignedIn(Identity);

    impl IdentityProvider for SignedIn {
        fn current(&self) -> Option<Identity> {
            Some(self.0.clone())
        }
    }

    struct SignedOut;

    impl IdentityProvider for SignedOut {
        fn current(&self) -> Option<Identity> {
            None
        }
    }

    #[test]
    fn test_collaborative_wins_over_individual() {
        let user = Identity::new(UserId::new(), "Noelia");
        let active = ActiveTrip::new();
        let resolver = ScopeResolver::new(Arc::new(SignedIn(user.clone())), active.clone());

        assert_eq!(resolver.resolve(), Scope::Individual(user.id));

        let trip_id = TripId::new();
        active.select(trip_id);
        assert_eq!(resolver.resolve(), Scope::Collaborative(trip_id));

        active.clear();
        assert_eq!(resolver.resolve(), Scope::Individual(user.id));
    }

    #[test]
    fn test_no_identity_means_ephemeral() {
        let active = ActiveTrip::new();
        // Even with a trip selected, there is nobody to sync as.
        active.select(TripId::new());

        let resolver = ScopeResolver::new(Arc::new(SignedOut), active);
        assert_eq!(resolver.resolve(), Scope::Ephemeral);
        assert!(resolver.resolve().is_ephemeral());
    }

    #[test]
    fn test_document_paths() {
        let user_id = UserId::new();
        let trip_id = TripId::new();

        assert_eq!(
            Scope::Individual(user_id).document_path("packing"),
            Some(format!("users/{user_id}/data/packing"))
        );
        assert_eq!(
            Scope::Collaborative(trip_id).document_path("packing"),
            Some(format!("trips/{trip_id}/data/packing"))
        );
        assert_eq!(Scope::Ephemeral.document_path("packing"), None);

        assert_eq!(
            Scope::Collaborative(trip_id).collection_path("chat"),
            Some(format!("trips/{trip_id}/chat"))
        );
        assert_eq!(Scope::Individual(user_id).collection_path("chat"), None);
    }
}
