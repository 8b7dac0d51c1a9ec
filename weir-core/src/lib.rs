//! Weir core library.
//!
//! Weir is a small log-collection server: it ingests records from external
//! sources (the system journal, locally or over ssh, or the process's own
//! standard input) and streams them as JSON events to HTTP clients.
//!
//! # Key components
//!
//! - **Scroll buffer**: a bounded scrolling byte buffer over a memory-mapped
//!   temporary file; one writer appends a live stream, any number of
//!   readers tail or scan it ([`scroll`]).
//! - **Records**: adapters that turn a byte source into a sequence of raw
//!   JSON values ([`records`]).
//! - **Datasources**: the registry that realises configured collections
//!   ([`datasource`]).
//! - **Config**: the TOML collection configuration ([`config`]).
//!
//! # Example
//!
//! ```no_run
//! use weir_core::scroll::ScrollBuffer;
//! use std::io::Read;
//! use std::time::Duration;
//!
//! # fn main() -> weir_core::Result<()> {
//! let buffer = ScrollBuffer::new(std::env::temp_dir(), 8192, 10)?;
//!
//! let mut writer = buffer.writer();
//! writer.write(b"{\"hello\":\"world\"}\n")?;
//! writer.close()?;
//!
//! let mut tail = String::new();
//! buffer.reader(false).read_to_string(&mut tail).ok();
//!
//! buffer.shutdown(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod datasource;
pub mod error;
pub mod records;
pub mod scroll;

// Re-export key types at crate root for convenience
pub use config::{Collection, Config};
pub use datasource::{Closer, CollectContext, CollectOpts, RecordStream, Registry};
pub use error::{Result, WeirError};
pub use records::RawRecord;
pub use scroll::ScrollBuffer;
