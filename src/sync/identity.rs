/// The signed-in account that owns remote rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
}

/// Answers "who is signed in", if anyone.
pub trait IdentityProvider: Send + Sync {
    fn user(&self) -> Option<User>;

    fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

/// Nobody is signed in; cloud mirroring is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn user(&self) -> Option<User> {
        None
    }
}

/// A fixed account, configured up front.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user: User,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user: User { id: user_id.into() },
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn user(&self) -> Option<User> {
        Some(self.user.clone())
    }
}
