//! Response builders for the API.
//!
//! Most endpoints answer with a buffered JSON body; the collect endpoint
//! streams, so the shared body type is boxed.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;

/// The response body type used across the API: either a buffered JSON
/// payload or a streaming SSE body.
pub type Body = BoxBody<Bytes, Infallible>;

/// Box a fully-buffered body.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).boxed()
}

/// Build a JSON response with status code.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body).unwrap_or_else(|e| {
        serde_json::json!({
            "error": {
                "message": format!("Serialization error: {}", e),
                "status": 500
            }
        })
        .to_string()
    });

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full(json))
        .expect("response builder should not fail")
}

/// Build a 200 OK JSON response.
pub fn ok<T: Serialize>(body: &T) -> Response<Body> {
    json_response(StatusCode::OK, body)
}

/// Build a 204 No Content response.
pub fn no_content() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(full(Bytes::new()))
        .expect("response builder should not fail")
}

/// Build a 404 Not Found response.
pub fn not_found() -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "message": "Not found",
            "status": 404
        }
    });
    json_response(StatusCode::NOT_FOUND, &body)
}

/// Build a 400 Bad Request response.
pub fn bad_request(message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "status": 400
        }
    });
    json_response(StatusCode::BAD_REQUEST, &body)
}

/// Build a 405 Method Not Allowed response.
pub fn method_not_allowed(allowed: &[&str]) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "message": format!("Method not allowed. Allowed: {}", allowed.join(", ")),
            "status": 405
        }
    });

    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "application/json")
        .header("Allow", allowed.join(", "))
        .body(full(body.to_string()))
        .expect("response builder should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response() {
        let body = serde_json::json!({"status": "healthy"});
        let response = ok(&body);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn no_content_response() {
        let response = no_content();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn not_found_response() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn method_not_allowed_response() {
        let response = method_not_allowed(&["GET"]);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get("Allow").unwrap(), "GET");
    }
}
