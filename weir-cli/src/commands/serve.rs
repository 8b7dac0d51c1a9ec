//! Serve command - run the weir API server.

use anyhow::Result;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weir_core::{Config, ScrollBuffer, WeirError};
use weir_server::{ApiServer, AppState, ServerConfig};

/// Slot size of the stdin scroll buffer.
const STDIN_SLOT_SIZE: usize = 8192;
/// Slot count of the stdin scroll buffer.
const STDIN_SLOT_COUNT: usize = 10;
/// How long shutdown waits for readers before discarding them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the serve command.
pub async fn run(listen_addr: &str, port: u16, config_path: &Path, stdin: bool) -> Result<()> {
    let (config, buffer) = if stdin {
        (Arc::new(Config::stdin_default()), Some(init_stdin()?))
    } else {
        (Arc::new(Config::load(config_path)?), None)
    };

    let state = match &buffer {
        Some(buffer) => AppState::with_stdin(config, buffer.clone()),
        None => AppState::new(config),
    };

    let mut server = ApiServer::new(ServerConfig::new(listen_addr, port), Arc::new(state));

    tracing::info!(host = %listen_addr, port = %port, "starting weir API server");
    println!("weir listening on http://{listen_addr}:{port}");
    println!("  GET /api/collections            - list collections");
    println!("  GET /api/collections/{{name}}     - stream records (SSE)");
    println!("Press Ctrl+C to stop.");

    let mut server_handle = tokio::spawn(async move { server.run().await });

    let outcome: Result<()> = tokio::select! {
        result = &mut server_handle => {
            result?.map_err(Into::into)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            server_handle.abort();
            Ok(())
        }
    };

    if let Some(buffer) = buffer {
        let result =
            tokio::task::spawn_blocking(move || buffer.shutdown(SHUTDOWN_GRACE)).await?;
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to shut down stdin buffer");
        }
    }

    outcome
}

/// Create the stdin scroll buffer and start the pump thread that tees
/// standard input into it and on to standard output.
fn init_stdin() -> Result<ScrollBuffer> {
    let dir = std::env::temp_dir().join("weir");
    std::fs::create_dir_all(&dir)?;

    let buffer = ScrollBuffer::new(&dir, STDIN_SLOT_SIZE, STDIN_SLOT_COUNT)?;

    let pump = buffer.clone();
    std::thread::spawn(move || pump_stdin(pump));

    Ok(buffer)
}

fn pump_stdin(buffer: ScrollBuffer) {
    let mut writer = buffer.writer();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut chunk = [0u8; STDIN_SLOT_SIZE];

    loop {
        let n = match stdin.lock().read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        };

        match writer.write(&chunk[..n]) {
            Ok(_) => {}
            // The buffer shut down under us; stop quietly.
            Err(WeirError::Closed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to buffer stdin");
                break;
            }
        }

        // Mirror the input so weir can sit in the middle of a pipeline.
        let _ = stdout.write_all(&chunk[..n]).and_then(|_| stdout.flush());
    }

    let _ = writer.close();
}
