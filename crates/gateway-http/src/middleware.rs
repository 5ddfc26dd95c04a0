//! Cross-cutting HTTP middleware, adapted from the teacher's
//! `MiddlewareConfig`/`MiddlewareStack` (logging, CORS, timeouts applied
//! uniformly across every route) down to the subset this gateway needs.

use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    pub cors_enabled: bool,
    pub tracing_enabled: bool,
    pub timeout: Duration,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self { cors_enabled: true, tracing_enabled: true, timeout: Duration::from_secs(30) }
    }
}

pub fn apply<S: Clone + Send + Sync + 'static>(router: Router<S>, config: &MiddlewareConfig) -> Router<S> {
    let mut router = router;
    if config.tracing_enabled {
        router = router.layer(TraceLayer::new_for_http());
    }
    if config.cors_enabled {
        router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }
    router = router.layer(TimeoutLayer::new(config.timeout));
    router
}
