//! Request routing for the API.
//!
//! Routes requests to appropriate handlers based on method and path.

use crate::handlers;
use crate::response::{self, Body};
use crate::state::AppState;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;

/// Route an incoming request to the appropriate handler.
pub async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    tracing::debug!(method = %method, path = %path, "routing request");

    let response = match (method, path.as_str()) {
        (Method::GET, "/api/health") => handlers::health::get_health(state).await,
        (Method::GET, "/api/collections") => handlers::collections::list(state).await,
        (method, p) if p.starts_with("/api/collections/") => {
            let name = p.trim_start_matches("/api/collections/");
            if name.is_empty() || name.contains('/') {
                response::not_found()
            } else if method == Method::GET {
                handlers::collections::collect(req, state, name).await
            } else {
                response::method_not_allowed(&["GET"])
            }
        }
        _ => response::not_found(),
    };

    Ok(response)
}
