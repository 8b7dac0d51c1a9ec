//! Collect command - dump a collection's records in the terminal.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use weir_core::datasource::{CollectContext, CollectOpts, Registry};
use weir_core::Config;

/// Run the collect command.
pub async fn run(name: &str, follow: bool, since: Option<&str>, config_path: &Path) -> Result<()> {
    let since = since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .context("invalid --since timestamp")
        })
        .transpose()?;

    let config = Arc::new(Config::load(config_path)?);
    let registry = Registry::builtin();
    let cx = CollectContext {
        config,
        stdin: None,
    };

    let stream = registry.collect(&cx, name, &CollectOpts { follow, since })?;
    let closer = stream.closer();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            closer.close();
        }
    });

    tokio::task::spawn_blocking(move || -> weir_core::Result<()> {
        for record in stream {
            println!("{}", record?.get());
        }
        Ok(())
    })
    .await??;

    Ok(())
}
