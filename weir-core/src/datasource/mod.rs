//! Datasources: where records come from.
//!
//! A datasource turns a collection's configuration into a [`RecordStream`]:
//! a blocking iterator of raw JSON records plus a [`Closer`] that releases
//! the underlying source from another thread. The registry maps the
//! config's `type` strings to datasource implementations; registration is
//! explicit, at construction time.

mod command;
mod journald;
mod ssh;
mod stdin;

pub use journald::{JournaldOptions, JournaldSource};
pub use ssh::{SshJournaldOptions, SshJournaldSource};
pub use stdin::StdinSource;

use crate::config::Config;
use crate::error::{Result, WeirError};
use crate::records::RawRecord;
use crate::scroll::ScrollBuffer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Options of one collect request.
#[derive(Debug, Clone, Default)]
pub struct CollectOpts {
    /// Tail the live stream instead of reading history.
    pub follow: bool,
    /// Read history from this instant. Ignored when following; defaults to
    /// one hour ago when absent.
    pub since: Option<DateTime<Utc>>,
}

/// Ambient state datasources draw on.
#[derive(Clone)]
pub struct CollectContext {
    /// The loaded configuration (for relative path resolution).
    pub config: Arc<Config>,
    /// The stdin scroll buffer, present only in `--stdin` mode.
    pub stdin: Option<ScrollBuffer>,
}

/// Releases a record stream's source from any thread: cancels a buffer
/// reader, interrupts a collector child process. Cloneable; calling it more
/// than once is harmless.
#[derive(Clone)]
pub struct Closer(Arc<dyn Fn() + Send + Sync>);

impl std::fmt::Debug for Closer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closer").finish_non_exhaustive()
    }
}

impl Closer {
    /// Wrap a close callback.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Closer {
        Closer(Arc::new(f))
    }

    /// A closer that does nothing.
    pub fn noop() -> Closer {
        Closer(Arc::new(|| {}))
    }

    /// Release the source. A stream whose source was closed either ends
    /// normally or yields its terminal error, exactly once.
    pub fn close(&self) {
        (self.0)();
    }
}

/// A lazy sequence of raw JSON records with an out-of-band cancel handle.
///
/// Back-pressure is the iterator contract: the source only advances when
/// the consumer pulls. Dropping the stream releases the source.
pub struct RecordStream {
    records: Box<dyn Iterator<Item = Result<RawRecord>> + Send>,
    closer: Closer,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}

impl RecordStream {
    /// Couple a record iterator with the handle that releases its source.
    pub fn new(
        records: impl Iterator<Item = Result<RawRecord>> + Send + 'static,
        closer: Closer,
    ) -> RecordStream {
        RecordStream {
            records: Box::new(records),
            closer,
        }
    }

    /// The stream's cancel handle.
    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }
}

impl Iterator for RecordStream {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

/// A source of records for one collection type.
pub trait Datasource: Send + Sync {
    /// Start collecting. `options` is the collection's raw config table.
    fn collect(
        &self,
        cx: &CollectContext,
        options: &serde_json::Value,
        opts: &CollectOpts,
    ) -> Result<RecordStream>;
}

/// Maps config `type` strings to datasources.
pub struct Registry {
    sources: HashMap<&'static str, Box<dyn Datasource>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry {
            sources: HashMap::new(),
        }
    }

    /// The registry with all builtin datasources.
    pub fn builtin() -> Registry {
        let mut registry = Registry::new();
        registry.register("journald", Box::new(JournaldSource));
        registry.register("ssh-journald", Box::new(SshJournaldSource));
        registry.register("stdin", Box::new(StdinSource));
        registry
    }

    /// Register a datasource under a `type` string.
    ///
    /// # Panics
    ///
    /// Panics if the type is already registered.
    pub fn register(&mut self, kind: &'static str, source: Box<dyn Datasource>) {
        let previous = self.sources.insert(kind, source);
        assert!(previous.is_none(), "datasource already registered: {kind}");
    }

    /// Resolve `name` against the config and start its datasource.
    pub fn collect(
        &self,
        cx: &CollectContext,
        name: &str,
        opts: &CollectOpts,
    ) -> Result<RecordStream> {
        let collection = cx
            .config
            .collection(name)
            .ok_or_else(|| WeirError::CollectionNotFound {
                name: name.to_string(),
            })?;

        let source =
            self.sources
                .get(collection.kind.as_str())
                .ok_or_else(|| WeirError::UnknownDatasource {
                    kind: collection.kind.clone(),
                })?;

        source.collect(cx, &collection.opts, opts)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Deserialize a collection's options for a datasource.
fn collection_options<T: serde::de::DeserializeOwned>(
    options: &serde_json::Value,
) -> Result<T> {
    serde_json::from_value(options.clone()).map_err(|e| WeirError::CollectionOptions {
        collection: options
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_of(text: &str) -> CollectContext {
        CollectContext {
            config: Arc::new(Config::parse(text, "config.toml").unwrap()),
            stdin: None,
        }
    }

    #[test]
    fn unknown_collection() {
        let registry = Registry::builtin();
        let cx = context_of("");
        let err = registry
            .collect(&cx, "nope", &CollectOpts::default())
            .unwrap_err();
        assert!(matches!(err, WeirError::CollectionNotFound { .. }));
    }

    #[test]
    fn unknown_datasource_type() {
        let registry = Registry::builtin();
        let cx = context_of("[[collection]]\nname = 'x'\ntype = 'syslog'\n");
        let err = registry
            .collect(&cx, "x", &CollectOpts::default())
            .unwrap_err();
        assert!(matches!(err, WeirError::UnknownDatasource { .. }));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = Registry::builtin();
        registry.register("stdin", Box::new(StdinSource));
    }

    #[test]
    fn stdin_requires_buffer() {
        let registry = Registry::builtin();
        let cx = context_of("[[collection]]\nname = 'x'\ntype = 'stdin'\n");
        let err = registry
            .collect(&cx, "x", &CollectOpts::default())
            .unwrap_err();
        assert!(matches!(err, WeirError::StdinUnavailable));
    }
}
