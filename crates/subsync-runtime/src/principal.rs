use std::sync::{Mutex, MutexGuard};

/// An authenticated application user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

/// Resolves the principal a reconciliation runs on behalf of.
pub trait PrincipalResolver: Send + Sync {
    /// `None` when `requested_user_id` has no authenticated principal.
    fn resolve(&self, requested_user_id: &str) -> Option<Principal>;
}

/// Service context: callers were authenticated at the edge, so any
/// non-blank user id is accepted as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrustedPrincipals;

impl PrincipalResolver for TrustedPrincipals {
    fn resolve(&self, requested_user_id: &str) -> Option<Principal> {
        let id = requested_user_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Principal {
            user_id: id.to_string(),
        })
    }
}

/// Device context: exactly one signed-in user, or none.
///
/// A request for any other user id does not resolve.
#[derive(Debug, Default)]
pub struct SessionPrincipal {
    current: Mutex<Option<String>>,
}

impl SessionPrincipal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(Some(user_id.into())),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.lock() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl PrincipalResolver for SessionPrincipal {
    fn resolve(&self, requested_user_id: &str) -> Option<Principal> {
        match self.lock().as_deref() {
            Some(current) if current == requested_user_id => Some(Principal {
                user_id: current.to_string(),
            }),
            _ => None,
        }
    }
}
