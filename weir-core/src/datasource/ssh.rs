//! The `ssh-journald` datasource: journalctl on a remote host.
//!
//! The remote side is plain journalctl, so the whole invocation is one
//! shell command string executed through the system `ssh` binary. Double
//! quotes are stripped from every user-controlled part of that string
//! before it is quoted. Identity and known-hosts options map onto the
//! corresponding ssh arguments; `BatchMode=yes` keeps the session
//! non-interactive.

use super::journald::{journalctl_args, JournaldOptions};
use super::{collection_options, command, CollectContext, CollectOpts, Datasource, RecordStream};
use crate::error::{Result, WeirError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Options of an `ssh-journald` collection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SshJournaldOptions {
    /// The journalctl options, as for the local source.
    #[serde(flatten)]
    pub journald: JournaldOptions,

    /// Remote host to connect to. Required.
    pub hostname: String,
    /// Remote port; ssh's default when absent.
    pub port: Option<u16>,
    /// Remote user; ssh's default when absent.
    pub username: Option<String>,
    /// Private key file, resolved against the config directory (`~/`
    /// expands to the home directory).
    pub identity_file: Option<String>,
    /// Overrides ssh's user known-hosts file.
    pub user_known_hosts_file: Option<String>,
    /// Overrides ssh's global known-hosts file.
    pub global_known_hosts_file: Option<String>,
    /// Restricts the host key algorithms offered.
    pub host_key_algorithms: Vec<String>,

    /// Alternative ssh binary. Not configurable from file; used by tests.
    #[serde(skip)]
    pub ssh: Option<String>,
}

/// Collects from a remote system journal over ssh.
pub struct SshJournaldSource;

impl Datasource for SshJournaldSource {
    fn collect(
        &self,
        cx: &CollectContext,
        options: &serde_json::Value,
        opts: &CollectOpts,
    ) -> Result<RecordStream> {
        let name = options
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        let options: SshJournaldOptions = collection_options(options)?;

        if options.hostname.is_empty() {
            return Err(WeirError::CollectionOptions {
                collection: name,
                cause: "hostname is required".to_string(),
            });
        }

        let mut command = Command::new(options.ssh.as_deref().unwrap_or("ssh"));
        command.args(ssh_args(cx.config.dir(), &options, opts));

        let (stream, closer) = command::spawn(command, !options.journald.no_docker_aware)?;
        Ok(RecordStream::new(stream, closer))
    }
}

fn drop_quote(text: &str) -> String {
    text.replace('"', "")
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", drop_quote(text))
}

/// The journalctl invocation as a single remote shell command.
fn remote_command(options: &JournaldOptions, opts: &CollectOpts) -> String {
    let program = options.journalctl.as_deref().unwrap_or("journalctl");

    let mut parts = vec![quoted(program)];
    parts.extend(journalctl_args(options, opts).iter().map(|a| quoted(a)));
    parts.join(" ")
}

fn ssh_args(config_dir: &Path, options: &SshJournaldOptions, opts: &CollectOpts) -> Vec<String> {
    let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];

    if let Some(port) = options.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(username) = &options.username {
        args.push("-l".to_string());
        args.push(username.clone());
    }
    if let Some(identity) = &options.identity_file {
        args.push("-i".to_string());
        args.push(
            resolve_path(config_dir, identity)
                .to_string_lossy()
                .into_owned(),
        );
    }
    if let Some(file) = &options.user_known_hosts_file {
        args.push("-o".to_string());
        args.push(format!("UserKnownHostsFile={file}"));
    }
    if let Some(file) = &options.global_known_hosts_file {
        args.push("-o".to_string());
        args.push(format!("GlobalKnownHostsFile={file}"));
    }
    if !options.host_key_algorithms.is_empty() {
        args.push("-o".to_string());
        args.push(format!(
            "HostKeyAlgorithms={}",
            options.host_key_algorithms.join(",")
        ));
    }

    args.push(options.hostname.clone());
    args.push(remote_command(&options.journald, opts));
    args
}

/// Resolve a config-supplied path: `~/` expands to the home directory,
/// relative paths resolve against the config directory.
fn resolve_path(config_dir: &Path, target: &str) -> PathBuf {
    if let Some(rest) = target.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = Path::new(target);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    config_dir.join(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn follow_opts() -> CollectOpts {
        CollectOpts {
            follow: true,
            since: None,
        }
    }

    #[test]
    fn remote_command_quotes_every_part() {
        let options = JournaldOptions {
            matches: vec![BTreeMap::from([(
                "CONTAINER_NAME".to_string(),
                "app".to_string(),
            )])],
            ..Default::default()
        };

        let cmd = remote_command(&options, &follow_opts());
        assert_eq!(
            cmd,
            r#""journalctl" "--output=json" "--follow" "CONTAINER_NAME=app""#
        );
    }

    #[test]
    fn remote_command_strips_embedded_quotes() {
        let options = JournaldOptions {
            matches: vec![BTreeMap::from([(
                "FIELD".to_string(),
                "va\"lue".to_string(),
            )])],
            ..Default::default()
        };

        let cmd = remote_command(&options, &follow_opts());
        assert!(cmd.ends_with(r#""FIELD=value""#));
    }

    #[test]
    fn ssh_args_full_set() {
        let options = SshJournaldOptions {
            hostname: "logs.example.com".to_string(),
            port: Some(2222),
            username: Some("bob".to_string()),
            identity_file: Some("/keys/id_ed25519".to_string()),
            user_known_hosts_file: Some("/kh/user".to_string()),
            global_known_hosts_file: Some("/kh/global".to_string()),
            host_key_algorithms: vec!["ssh-ed25519".to_string(), "rsa-sha2-512".to_string()],
            ..Default::default()
        };

        let args = ssh_args(Path::new("/etc/weir"), &options, &follow_opts());
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-l",
                "bob",
                "-i",
                "/keys/id_ed25519",
                "-o",
                "UserKnownHostsFile=/kh/user",
                "-o",
                "GlobalKnownHostsFile=/kh/global",
                "-o",
                "HostKeyAlgorithms=ssh-ed25519,rsa-sha2-512",
                "logs.example.com",
                r#""journalctl" "--output=json" "--follow""#,
            ]
        );
    }

    #[test]
    fn ssh_args_minimal() {
        let options = SshJournaldOptions {
            hostname: "host".to_string(),
            ..Default::default()
        };

        let args = ssh_args(Path::new("/etc/weir"), &options, &follow_opts());
        assert_eq!(args[..2], ["-o", "BatchMode=yes"]);
        assert_eq!(args[2], "host");
    }

    #[test]
    fn resolve_path_variants() {
        let dir = Path::new("/etc/weir");
        assert_eq!(
            resolve_path(dir, "/abs/key"),
            PathBuf::from("/abs/key")
        );
        assert_eq!(
            resolve_path(dir, "keys/id_rsa"),
            PathBuf::from("/etc/weir/keys/id_rsa")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_path(dir, "~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
        }
    }

    #[test]
    fn options_flatten_journald_fields() {
        let raw = serde_json::json!({
            "name": "remote",
            "type": "ssh-journald",
            "hostname": "logs.example.com",
            "no-docker-aware": true,
            "match": [{"CONTAINER_NAME": "app"}]
        });

        let options: SshJournaldOptions = collection_options(&raw).unwrap();
        assert_eq!(options.hostname, "logs.example.com");
        assert!(options.journald.no_docker_aware);
        assert_eq!(options.journald.matches.len(), 1);
    }

    #[test]
    fn empty_hostname_is_rejected() {
        let cx = CollectContext {
            config: std::sync::Arc::new(crate::config::Config::stdin_default()),
            stdin: None,
        };
        let raw = serde_json::json!({ "name": "remote", "type": "ssh-journald" });

        let err = SshJournaldSource
            .collect(&cx, &raw, &follow_opts())
            .unwrap_err();
        assert!(matches!(err, WeirError::CollectionOptions { .. }));
    }
}
