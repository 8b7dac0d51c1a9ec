//! The local `journald` datasource.
//!
//! Runs `journalctl --output=json` and decodes its export stream. Each
//! `match` table contributes `KEY=value` arguments; keys iterate in sorted
//! order so the spawned command line is deterministic.

use super::{collection_options, command, CollectContext, CollectOpts, Datasource, RecordStream};
use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Command;

/// Options of a `journald` collection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JournaldOptions {
    /// Disable docker partial-message reassembly.
    pub no_docker_aware: bool,

    /// Journal match terms; each map is a set of `FIELD=value` filters.
    #[serde(rename = "match")]
    pub matches: Vec<BTreeMap<String, String>>,

    /// Alternative journalctl binary. Not configurable from file; used by
    /// tests.
    #[serde(skip)]
    pub journalctl: Option<String>,
}

/// Collects from the local system journal.
pub struct JournaldSource;

impl Datasource for JournaldSource {
    fn collect(
        &self,
        _cx: &CollectContext,
        options: &serde_json::Value,
        opts: &CollectOpts,
    ) -> Result<RecordStream> {
        let options: JournaldOptions = collection_options(options)?;
        spawn_journalctl(&options, opts)
    }
}

/// Spawn journalctl with the derived arguments and stream its records.
pub(crate) fn spawn_journalctl(
    options: &JournaldOptions,
    opts: &CollectOpts,
) -> Result<RecordStream> {
    let mut command = Command::new(options.journalctl.as_deref().unwrap_or("journalctl"));
    command.args(journalctl_args(options, opts));

    let (stream, closer) = command::spawn(command, !options.no_docker_aware)?;
    Ok(RecordStream::new(stream, closer))
}

pub(crate) fn journalctl_args(options: &JournaldOptions, opts: &CollectOpts) -> Vec<String> {
    let mut args = vec!["--output=json".to_string()];

    if opts.follow {
        args.push("--follow".to_string());
    } else {
        args.push(format!("--since={}", since_argument(opts)));
    }

    for matches in &options.matches {
        for (key, value) in matches {
            args.push(format!("{key}={value}"));
        }
    }

    args
}

fn since_argument(opts: &CollectOpts) -> String {
    let since = opts
        .since
        .unwrap_or_else(|| Utc::now() - chrono::Duration::hours(1));
    since.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn epoch_opts() -> CollectOpts {
        CollectOpts {
            follow: false,
            since: Some(DateTime::from_timestamp(0, 0).unwrap()),
        }
    }

    #[test]
    fn follow_replaces_since() {
        let args = journalctl_args(
            &JournaldOptions::default(),
            &CollectOpts {
                follow: true,
                since: None,
            },
        );
        assert_eq!(args, vec!["--output=json", "--follow"]);
    }

    #[test]
    fn since_is_rfc3339() {
        let args = journalctl_args(&JournaldOptions::default(), &epoch_opts());
        assert_eq!(
            args,
            vec!["--output=json", "--since=1970-01-01T00:00:00Z"]
        );
    }

    #[test]
    fn match_terms_iterate_in_sorted_key_order() {
        let options = JournaldOptions {
            matches: vec![BTreeMap::from([
                ("_SYSTEMD_UNIT".to_string(), "app.service".to_string()),
                ("CONTAINER_NAME".to_string(), "app".to_string()),
            ])],
            ..Default::default()
        };

        let args = journalctl_args(&options, &epoch_opts());
        assert_eq!(args[2], "CONTAINER_NAME=app");
        assert_eq!(args[3], "_SYSTEMD_UNIT=app.service");
    }

    #[test]
    fn options_deserialize_from_collection_table() {
        let raw = serde_json::json!({
            "name": "default",
            "type": "journald",
            "no-docker-aware": true,
            "match": [{"CONTAINER_NAME": "fuzz"}]
        });

        let options: JournaldOptions = collection_options(&raw).unwrap();
        assert!(options.no_docker_aware);
        assert_eq!(options.matches[0]["CONTAINER_NAME"], "fuzz");
    }

    #[cfg(unix)]
    #[test]
    fn collect_runs_journalctl_and_decodes() {
        use std::os::unix::fs::PermissionsExt;

        // Fake journalctl: echoes each argument as one record, then a
        // docker-split long message.
        let script_text = r##"#!/bin/sh
for arg in "$@"; do
  printf '{"MESSAGE":"{\\"arg\\":\\"%s\\"}"}\n' "$arg"
done
printf '{"MESSAGE":"{\\"data\\":\\"loooooooong-","CONTAINER_PARTIAL_MESSAGE":"true"}\n'
printf '{"MESSAGE":"message\\"}"}\n'
"##;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("journalctl.sh");
        std::fs::write(&script, script_text).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let options = JournaldOptions {
            matches: vec![BTreeMap::from([(
                "CONTAINER_NAME".to_string(),
                "mycontainer".to_string(),
            )])],
            journalctl: Some(script.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let stream = spawn_journalctl(&options, &epoch_opts()).unwrap();
        let got: Vec<String> = stream.map(|r| r.unwrap().get().to_string()).collect();

        assert_eq!(
            got,
            vec![
                r#"{"arg":"--output=json"}"#,
                r#"{"arg":"--since=1970-01-01T00:00:00Z"}"#,
                r#"{"arg":"CONTAINER_NAME=mycontainer"}"#,
                r#"{"data":"loooooooong-message"}"#,
            ]
        );
    }
}
