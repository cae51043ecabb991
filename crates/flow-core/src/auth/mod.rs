//! Session context
//!
//! Repositories never read authentication state ambiently; callers pass an
//! explicit [`Session`]. `None` in an `Option<&Session>` parameter means
//! "signed out / offline": reads come back empty and writes stay local-only.

use std::sync::RwLock;

/// The authenticated user for one sequence of repository operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
}

impl Session {
    /// Create a session for the given user id
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// The authenticated user's id
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Shared login state for an app shell.
///
/// Switching users does not re-point live subscriptions; the shell must stop
/// listeners for the old session and start them for the new one.
#[derive(Debug, Default)]
pub struct SessionState {
    current: RwLock<Option<Session>>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sign-in
    pub fn login(&self, session: Session) {
        *self.write() = Some(session);
    }

    /// Record a sign-out
    pub fn logout(&self) {
        *self.write() = None;
    }

    /// The current session, if signed in
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
        self.current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
