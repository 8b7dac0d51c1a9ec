//! Collection endpoints: listing and SSE record streaming.
//!
//! The collect endpoint bridges the blocking record iterator into an async
//! streaming body: the iterator runs on a blocking thread and feeds a
//! bounded channel, which is the consumer's back-pressure; when the client
//! disconnects the channel closes, the producer stops, and the stream's
//! closer releases the source.

use crate::response::{self, Body};
use crate::state::AppState;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use weir_core::datasource::{CollectOpts, RecordStream};
use weir_core::WeirError;

/// Bound of the SSE channel: how many frames may be in flight between the
/// producer and a slow client.
const STREAM_BUFFER: usize = 16;

type SseFrame = Result<Frame<Bytes>, Infallible>;

/// GET /api/collections
///
/// List the configured collections.
pub async fn list(state: Arc<AppState>) -> Response<Body> {
    let collections: Vec<serde_json::Value> = state
        .config
        .collections
        .iter()
        .map(|c| serde_json::json!({ "name": c.name }))
        .collect();

    response::ok(&serde_json::json!({ "collections": collections }))
}

/// GET /api/collections/{name}
///
/// Stream a collection's records as Server-Sent-Events. Query parameters:
/// - `tail`: follow the live stream instead of reading history
/// - `since`: RFC3339 start of the history window (default: one hour ago)
pub async fn collect(req: Request<Incoming>, state: Arc<AppState>, name: &str) -> Response<Body> {
    // The stream carries no replayable event IDs; a reconnecting client
    // gets nothing rather than a duplicate history.
    if req.headers().contains_key("last-event-id") {
        return response::no_content();
    }

    collect_response(state, name, req.uri().query().unwrap_or("")).await
}

/// The collect endpoint behind request plumbing, for tests to call
/// directly.
pub(crate) async fn collect_response(
    state: Arc<AppState>,
    name: &str,
    query: &str,
) -> Response<Body> {
    let opts = match parse_collect_opts(query) {
        Ok(opts) => opts,
        Err(e) => {
            tracing::debug!(collection = name, error = %e, "bad collect request");
            return response::bad_request("bad request.");
        }
    };

    let stream = match state
        .registry
        .collect(&state.collect_context(), name, &opts)
    {
        Ok(stream) => stream,
        Err(WeirError::CollectionNotFound { .. }) => return response::not_found(),
        Err(e) => {
            tracing::warn!(collection = name, error = %e, "failed to start collection");
            return response::bad_request("bad request.");
        }
    };

    let closer = stream.closer();
    let (tx, rx) = mpsc::channel::<SseFrame>(STREAM_BUFFER);

    tokio::task::spawn_blocking(move || pump(stream, tx));

    // The guard rides inside the body: when hyper drops the response body
    // (client disconnect, or the stream ran out) the source is released,
    // which also unblocks a producer waiting for more records.
    let guard = SourceGuard(closer);
    let frames = ReceiverStream::new(rx).map(move |frame| {
        let _keep_alive = &guard;
        frame
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .body(StreamBody::new(frames).boxed())
        .expect("response builder should not fail")
}

struct SourceGuard(weir_core::Closer);

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Drain the record stream into the SSE channel.
fn pump(stream: RecordStream, tx: mpsc::Sender<SseFrame>) {
    let mut first = true;
    for item in stream {
        match item {
            Ok(raw) => {
                let frame = data_frame(&mut first, raw.get());
                if tx.blocking_send(Ok(Frame::data(frame))).is_err() {
                    // Client gone; the stream drop releases the source.
                    return;
                }
            }
            Err(e) => {
                // Terminate without the eof event so the client observes an
                // abnormal close.
                tracing::warn!(error = %e, "record stream failed");
                return;
            }
        }
    }

    let _ = tx.blocking_send(Ok(Frame::data(eof_frame(first))));
}

fn data_frame(first: &mut bool, json: &str) -> Bytes {
    let mut buf = Vec::with_capacity(json.len() + 16);
    if *first {
        *first = false;
        buf.extend_from_slice(b"id:-\r\n");
    }
    buf.extend_from_slice(b"data:");
    buf.extend_from_slice(json.as_bytes());
    buf.extend_from_slice(b"\r\n\r\n");
    Bytes::from(buf)
}

fn eof_frame(first: bool) -> Bytes {
    let mut buf = Vec::new();
    if first {
        buf.extend_from_slice(b"id:-\r\n");
    }
    buf.extend_from_slice(b"event:eof\r\ndata:\r\n\r\n");
    Bytes::from(buf)
}

fn parse_collect_opts(query: &str) -> Result<CollectOpts, String> {
    let mut opts = CollectOpts::default();

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, urlencoding::decode(v).unwrap_or_default()),
            None => (pair, "".into()),
        };

        match key {
            "tail" => {
                opts.follow = matches!(value.as_ref(), "true" | "1");
            }
            "since" => {
                let parsed = DateTime::parse_from_rfc3339(value.as_ref())
                    .map_err(|e| format!("invalid since timestamp '{value}': {e}"))?;
                opts.since = Some(parsed.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    if !opts.follow && opts.since.is_none() {
        opts.since = Some(Utc::now() - chrono::Duration::hours(1));
    }

    Ok(opts)
}
