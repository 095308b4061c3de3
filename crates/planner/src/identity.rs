/// Identity providers. The real app plugs an auth backend in here; the
/// engine only needs "who is signed in right now, if anyone".
use parking_lot::RwLock;
use sync::IdentityProvider;
use trip::Identity;

/// Always signed in as one fixed identity (tests, single-user tools)
pub struct FixedIdentity(pub Identity);

impl IdentityProvider for FixedIdentity {
    fn current(&self) -> Option<Identity> {
        Some(self.0.clone())
    }
}

/// Never signed in
pub struct SignedOut;

impl IdentityProvider for SignedOut {
    fn current(&self) -> Option<Identity> {
        None
    }
}

/// Mutable session identity: sign in / sign out at runtime.
/// Features re-resolve their scope after either transition.
#[derive(Default)]
pub struct SessionIdentity {
    current: RwLock<Option<Identity>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: Identity) {
        *self.current.write() = Some(identity);
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<Identity> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trip::UserId;

    #[test]
    fn test_session_identity_transitions() {
        let session = SessionIdentity::new();
        assert!(session.current().is_none());

        let me = Identity::new(UserId::new(), "Noelia").with_email("noelia@example.com");
        session.sign_in(me.clone());
        assert_eq!(session.current(), Some(me));

        session.sign_out();
        assert!(session.current().is_none());
    }
}
