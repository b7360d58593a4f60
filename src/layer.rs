//! Tower middleware that admits requests through a [`Limiter`].
//!
//! Each call waits for a permit (pacing included), then runs the inner service and holds the
//! permit until the response future completes. Readiness and errors of the inner service pass
//! through untouched; the limiter itself never fails a request.

use crate::limiter::Limiter;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Layer applying a shared [`Limiter`] to every wrapped service.
#[derive(Clone, Debug)]
pub struct LimitLayer {
    limiter: Limiter,
}

impl LimitLayer {
    /// Wrap services with `limiter`. All services built by this layer share it.
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for LimitLayer {
    type Service = LimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        LimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Service produced by [`LimitLayer`].
#[derive(Clone, Debug)]
pub struct LimitService<S> {
    inner: S,
    limiter: Limiter,
}

impl<S> LimitService<S> {
    /// Wrap `inner` directly, without going through a layer.
    pub fn new(inner: S, limiter: Limiter) -> Self {
        Self { inner, limiter }
    }

    /// Limiter guarding this service.
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }
}

impl<S, Req> Service<Req> for LimitService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        // Keep the instance that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let permit = limiter.permit_async().await;
            let response = inner.call(req).await;
            drop(permit);
            response
        })
    }
}
