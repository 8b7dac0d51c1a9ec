//! Health endpoint handler.

use crate::response::{self, Body};
use crate::state::AppState;
use hyper::Response;
use std::sync::Arc;

/// GET /api/health
///
/// Simple health check that returns 200 OK if the server is running.
pub async fn get_health(_state: Arc<AppState>) -> Response<Body> {
    let body = serde_json::json!({
        "status": "healthy",
        "service": "weir"
    });

    response::ok(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use weir_core::Config;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let state = Arc::new(AppState::new(Arc::new(
            Config::parse("", "config.toml").unwrap(),
        )));
        let response = get_health(state).await;

        assert_eq!(response.status(), StatusCode::OK);
    }
}
