//! Identity resolution port.
//!
//! The outer HTTP layer extracts a session token from the request; an
//! `IdentityResolver` turns it into a typed [`Identity`] before any
//! WebSocket upgrade happens.

use stacks_types::error::AuthError;
use stacks_types::identity::Identity;

/// Resolves a session token to the user id, role and display name behind it.
///
/// Implementations live in stacks-infra (e.g., `SqliteIdentityStore`).
pub trait IdentityResolver: Send + Sync {
    fn resolve(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}
