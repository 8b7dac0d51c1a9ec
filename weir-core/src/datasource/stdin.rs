//! The `stdin` datasource: records out of the process's own input.
//!
//! Available only when the process was started in stdin mode, which tees
//! standard input into a shared scroll buffer. Each request gets its own
//! buffer reader: following requests tail the live stream, the rest scan
//! the retained history.

use super::{Closer, CollectContext, CollectOpts, Datasource, RecordStream};
use crate::error::{Result, WeirError};
use crate::records::LineRecords;
use std::io::BufReader;

/// Collects line-delimited JSON from the stdin scroll buffer.
pub struct StdinSource;

impl Datasource for StdinSource {
    fn collect(
        &self,
        cx: &CollectContext,
        _options: &serde_json::Value,
        opts: &CollectOpts,
    ) -> Result<RecordStream> {
        let buffer = cx.stdin.as_ref().ok_or(WeirError::StdinUnavailable)?;

        let reader = buffer.reader(opts.follow);
        let canceller = reader.canceller();

        Ok(RecordStream::new(
            LineRecords::new(BufReader::new(reader)),
            Closer::new(move || canceller.cancel()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::scroll::ScrollBuffer;
    use std::sync::Arc;
    use std::time::Duration;

    fn stdin_context(buffer: &ScrollBuffer) -> CollectContext {
        CollectContext {
            config: Arc::new(Config::stdin_default()),
            stdin: Some(buffer.clone()),
        }
    }

    #[test]
    fn scans_retained_lines() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = ScrollBuffer::new(dir.path(), 1024, 4).unwrap();

        let mut w = buffer.writer();
        w.write(b"{\"a\":1}\nnot json\n{\"b\":2}\n").unwrap();
        w.close().unwrap();

        let stream = StdinSource
            .collect(
                &stdin_context(&buffer),
                &serde_json::json!({}),
                &CollectOpts::default(),
            )
            .unwrap();

        let got: Vec<String> = stream.map(|r| r.unwrap().get().to_string()).collect();
        assert_eq!(got, vec![r#"{"a":1}"#, r#"{"b":2}"#]);

        buffer.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn closer_unblocks_a_following_stream() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = ScrollBuffer::new(dir.path(), 1024, 4).unwrap();

        let stream = StdinSource
            .collect(
                &stdin_context(&buffer),
                &serde_json::json!({}),
                &CollectOpts {
                    follow: true,
                    since: None,
                },
            )
            .unwrap();
        let closer = stream.closer();

        let worker = std::thread::spawn(move || stream.count());

        std::thread::sleep(Duration::from_millis(50));
        closer.close();

        // The cancelled reader ends the sequence without an error record.
        assert_eq!(worker.join().unwrap(), 0);

        buffer.shutdown(Duration::from_secs(1)).unwrap();
    }
}
