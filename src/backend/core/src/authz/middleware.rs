//! Axum integration: resolves the caller's [`Identity`] once per request.
//!
//! Runs after the credential layer. Authenticated requests whose identity
//! cannot be resolved are rejected with 401 before reaching a handler.
//! Anonymous requests on public paths pass through without an identity.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::identity::resolve;
use super::models::Identity;
use crate::error::BizdashError;
use crate::middleware::auth::AuthContext;
use crate::store::RowStore;

/// Extractor for the resolved caller identity.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = BizdashError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| BizdashError::unauthenticated("request carries no resolved identity"))
    }
}

/// Layer that resolves identities against the user directory.
#[derive(Clone)]
pub struct IdentityLayer {
    directory: Arc<dyn RowStore>,
}

impl IdentityLayer {
    pub fn new(directory: Arc<dyn RowStore>) -> Self {
        Self { directory }
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            directory: self.directory.clone(),
        }
    }
}

/// Service that attaches the resolved identity to request extensions.
#[derive(Clone)]
pub struct IdentityService<S> {
    inner: S,
    directory: Arc<dyn RowStore>,
}

impl<S> Service<Request<Body>> for IdentityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let directory = self.directory.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let credential = match request.extensions().get::<AuthContext>() {
                Some(ctx) if ctx.is_authenticated() => ctx.credential(),
                _ => return inner.call(request).await,
            };

            match resolve(&credential, directory.as_ref()).await {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    inner.call(request).await
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}
