// src/api/auth.rs
// Stub bearer-token Authenticator. A real IdP integration is out of scope
// (spec.md §1); this implementation exists so the core is runnable and
// testable end to end without an external auth dependency.

use crate::error::{CoreError, CoreResult};
use crate::search::Authenticator;
use async_trait::async_trait;

/// Treats the bearer token as the actor id directly. Adequate for local
/// development and integration tests; production deployments should
/// replace this with a real token-verification collaborator.
pub struct StaticTokenAuthenticator;

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> CoreResult<String> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(CoreError::unauthorized("missing bearer token"));
        }
        Ok(trimmed.to_string())
    }
}
