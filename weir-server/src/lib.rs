//! Weir HTTP API.
//!
//! A small hyper server over the core library: collection listing, health,
//! and the Server-Sent-Events endpoint that streams a collection's records.

pub mod handlers;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use server::{ApiServer, ServerConfig};
pub use state::AppState;
