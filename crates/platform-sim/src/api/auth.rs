use std::sync::Arc;

use poem::Endpoint;
use poem::Middleware;
use poem::Request;
use poem::Result as PoemResult;
use tracing::debug;

use crate::domain::PlatformEngine;
use crate::domain::PlatformError;

/// Resolves `Authorization: Bearer <token>` to a [`Caller`] stored in the
/// request extensions. Requests without a known token are rejected with 401
/// before reaching the handler.
///
/// [`Caller`]: crate::domain::types::Caller
#[derive(Clone)]
pub struct BearerAuthMiddleware {
    engine: Arc<PlatformEngine>,
}

impl BearerAuthMiddleware {
    pub fn new(engine: Arc<PlatformEngine>) -> Self {
        Self { engine }
    }
}

impl<E> Middleware<E> for BearerAuthMiddleware
where E: Endpoint
{
    type Output = BearerAuthEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        BearerAuthEndpoint {
            inner: ep,
            engine: Arc::clone(&self.engine),
        }
    }
}

pub struct BearerAuthEndpoint<E> {
    inner: E,
    engine: Arc<PlatformEngine>,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<E> Endpoint for BearerAuthEndpoint<E>
where E: Endpoint
{
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> PoemResult<Self::Output> {
        let caller = bearer_token(&req)
            .ok_or(PlatformError::Unauthorized)
            .and_then(|token| self.engine.authenticate(token))
            .inspect_err(|_| debug!(path = %req.uri().path(), "Rejected unauthenticated request"))?;

        req.extensions_mut().insert(caller);
        self.inner.call(req).await
    }
}
