//! Authentication types for the domain layer.
//!
//! [`AuthenticatedUser`] is populated by the authentication middleware
//! after token validation and injected into request extensions. The rate
//! governor only consumes the subject id; it performs no validation of
//! its own.

use super::UserId;

/// Authenticated user extracted from a validated session.
///
/// A domain type with no provider dependencies: any auth middleware can
/// populate it via `request.extensions_mut().insert(user)`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// The unique user identifier from the auth provider.
    pub id: UserId,
}

impl AuthenticatedUser {
    /// Creates a new authenticated user.
    pub fn new(id: UserId) -> Self {
        Self { id }
    }
}
