use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::{Duration, Instant};

/// Logs every request that takes longer than `threshold` to answer.
#[derive(Clone, Copy, Debug)]
pub struct SlowRequest {
    threshold: Duration,
}

impl SlowRequest {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SlowRequest
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SlowRequestMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SlowRequestMiddleware {
            service,
            threshold: self.threshold,
        }))
    }
}

pub struct SlowRequestMiddleware<S> {
    service: S,
    threshold: Duration,
}

impl<S, B> Service<ServiceRequest> for SlowRequestMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let threshold = self.threshold;
        let method = req.method().clone();
        let uri = req.uri().clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await;
            let elapsed = started.elapsed();
            if elapsed > threshold {
                log::warn!("slow request {} {} took {:?}", method, uri, elapsed);
            }
            res
        })
    }
}
