//! Record iteration: turning a byte source into a sequence of raw JSON
//! values.
//!
//! Two shapes cover every datasource. [`LineRecords`] splits the source on
//! newlines and treats each line as one JSON value (the stdin source).
//! [`JournalRecords`] decodes a stream of journal export objects and
//! extracts the `MESSAGE` payload, reassembling docker's partial-message
//! chunks (the journal command sources).
//!
//! Both skip records that fail to parse: log streams carry garbage and a
//! single bad line must not kill the collection. Source-level I/O errors
//! are different: they surface exactly once, after which the iterator is
//! fused.

use crate::error::{Result, WeirError};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::io::{BufRead, Read};

/// A raw, unparsed JSON value passed through to the consumer.
pub type RawRecord = Box<RawValue>;

fn parse_record(bytes: &[u8]) -> Option<RawRecord> {
    serde_json::from_slice(bytes).ok()
}

/// True for the I/O error a cancelled buffer reader produces.
fn is_cancellation(e: &std::io::Error) -> bool {
    e.get_ref()
        .and_then(|inner| inner.downcast_ref::<WeirError>())
        .is_some_and(|w| matches!(w, WeirError::Closed))
}

/// Line-delimited records: one JSON value per line, malformed lines
/// dropped.
pub struct LineRecords<R> {
    reader: R,
    line: Vec<u8>,
    done: bool,
}

impl<R: BufRead> LineRecords<R> {
    /// Wrap a buffered byte source.
    pub fn new(reader: R) -> LineRecords<R> {
        LineRecords {
            reader,
            line: Vec::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for LineRecords<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    while matches!(self.line.last(), Some(&(b'\n' | b'\r'))) {
                        self.line.pop();
                    }
                    match parse_record(&self.line) {
                        Some(raw) => return Some(Ok(raw)),
                        None => {
                            tracing::debug!("skipping unparseable record line");
                            continue;
                        }
                    }
                }
                Err(e) => {
                    self.done = true;
                    if is_cancellation(&e) {
                        // Our own stop signal; the sequence just ends.
                        return None;
                    }
                    return Some(Err(WeirError::RecordRead {
                        cause: e.to_string(),
                    }));
                }
            }
        }
    }
}

/// One object of `journalctl --output=json`.
///
/// `CONTAINER_PARTIAL_MESSAGE` is docker's log-integrity flag: long
/// container lines arrive split across several journal entries, each but
/// the last flagged `"true"`.
#[derive(Debug, Default, Deserialize)]
struct JournalEntry {
    #[serde(default, rename = "MESSAGE")]
    message: String,

    #[serde(default, rename = "CONTAINER_PARTIAL_MESSAGE")]
    container_partial_message: String,
}

/// Records decoded out of a journal export stream.
///
/// Each entry's `MESSAGE` payload is expected to be a JSON value; payloads
/// that are not parse as JSON are dropped. With `docker_aware` (the
/// default for the journal sources) partial messages are concatenated until
/// the first non-partial entry flushes them; a pending payload is flushed
/// at clean end of stream.
pub struct JournalRecords<R: Read> {
    stream: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<R>, JournalEntry>,
    partial: Option<Vec<u8>>,
    docker_aware: bool,
    done: bool,
}

impl<R: Read> JournalRecords<R> {
    /// Wrap a journal export stream.
    pub fn new(reader: R, docker_aware: bool) -> JournalRecords<R> {
        JournalRecords {
            stream: serde_json::Deserializer::from_reader(reader).into_iter(),
            partial: None,
            docker_aware,
            done: false,
        }
    }

    fn flush(&mut self) -> Option<RawRecord> {
        let payload = self.partial.take()?;
        match parse_record(&payload) {
            Some(raw) => Some(raw),
            None => {
                tracing::debug!("skipping unparseable journal payload");
                None
            }
        }
    }
}

impl<R: Read> Iterator for JournalRecords<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.stream.next() {
                Some(Ok(entry)) => {
                    self.partial
                        .get_or_insert_with(Vec::new)
                        .extend_from_slice(entry.message.as_bytes());

                    if self.docker_aware && entry.container_partial_message == "true" {
                        continue;
                    }

                    match self.flush() {
                        Some(raw) => return Some(Ok(raw)),
                        None => continue,
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(WeirError::RecordRead {
                        cause: e.to_string(),
                    }));
                }
                None => {
                    self.done = true;
                    return self.flush().map(Ok);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_lines(input: &str) -> Vec<String> {
        LineRecords::new(Cursor::new(input.as_bytes()))
            .map(|r| r.unwrap().get().to_string())
            .collect()
    }

    fn collect_journal(input: &str, docker_aware: bool) -> Vec<String> {
        JournalRecords::new(Cursor::new(input.as_bytes()), docker_aware)
            .map(|r| r.unwrap().get().to_string())
            .collect()
    }

    #[test]
    fn lines_skip_malformed() {
        let got = collect_lines("{\"a\":1}\nnot json\n{\"b\":2}\n");
        assert_eq!(got, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn lines_without_trailing_newline() {
        let got = collect_lines("{\"a\":1}\r\n{\"b\":2}");
        assert_eq!(got, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn lines_empty_input() {
        assert!(collect_lines("").is_empty());
    }

    #[test]
    fn journal_extracts_messages() {
        let input = concat!(
            r#"{"MESSAGE":"{\"a\":1}"}"#,
            "\n",
            r#"{"MESSAGE":"{\"b\":2}"}"#,
            "\n",
        );
        let got = collect_journal(input, true);
        assert_eq!(got, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn journal_concatenates_partial_messages() {
        let input = concat!(
            r#"{"MESSAGE":"{\"msg\":\"lo","CONTAINER_PARTIAL_MESSAGE":"true"}"#,
            "\n",
            r#"{"MESSAGE":"ng\"}"}"#,
            "\n",
        );
        let got = collect_journal(input, true);
        assert_eq!(got, vec![r#"{"msg":"long"}"#]);
    }

    #[test]
    fn journal_partial_flag_ignored_when_not_docker_aware() {
        // Without docker awareness each chunk stands alone; neither half is
        // valid JSON, so both are dropped.
        let input = concat!(
            r#"{"MESSAGE":"{\"msg\":\"lo","CONTAINER_PARTIAL_MESSAGE":"true"}"#,
            "\n",
            r#"{"MESSAGE":"ng\"}"}"#,
            "\n",
        );
        assert!(collect_journal(input, false).is_empty());
    }

    #[test]
    fn journal_flushes_pending_partial_at_eof() {
        let input = concat!(
            r#"{"MESSAGE":"{\"tail\":","CONTAINER_PARTIAL_MESSAGE":"true"}"#,
            "\n",
            r#"{"MESSAGE":"true}","CONTAINER_PARTIAL_MESSAGE":"true"}"#,
            "\n",
        );
        let got = collect_journal(input, true);
        assert_eq!(got, vec![r#"{"tail":true}"#]);
    }

    #[test]
    fn journal_drops_non_json_payloads() {
        let input = concat!(
            r#"{"MESSAGE":"plain text"}"#,
            "\n",
            r#"{"MESSAGE":"{\"ok\":true}"}"#,
            "\n",
        );
        let got = collect_journal(input, true);
        assert_eq!(got, vec![r#"{"ok":true}"#]);
    }

    #[test]
    fn journal_surfaces_truncated_stream_once() {
        let mut iter = JournalRecords::new(Cursor::new(&b"{\"MESSAGE\":"[..]), true);
        assert!(matches!(
            iter.next(),
            Some(Err(WeirError::RecordRead { .. }))
        ));
        assert!(iter.next().is_none());
    }
}
