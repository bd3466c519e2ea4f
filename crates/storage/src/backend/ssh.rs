//! Remote filesystem over SSH.
//!
//! Shells out to the system `ssh` client, so host keys, agents and
//! `~/.ssh/config` aliases behave exactly as they do on the command line.
//! Sessions run with `BatchMode=yes`; anything that would prompt fails
//! instead.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, path::to_key};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Remote scripts exit with this code when the target path is missing.
const MISSING_EXIT_CODE: i32 = 44;

/// Configuration map accepted by the `ssh` /
/// `remote-filesystem-over-secure-shell` backend tag.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Absolute directory on the remote host that all paths are relative to.
    pub root: String,
    /// Explicit client binary; looked up on `PATH` when absent.
    #[serde(default)]
    pub ssh_binary: Option<PathBuf>,
}

/// Storage backend for a directory on a remote host.
#[derive(Clone, Debug)]
pub struct SshBackend {
    name: String,
    binary: PathBuf,
    destination: String,
    port: Option<u16>,
    root: String,
}

impl SshBackend {
    pub fn new(name: impl Into<String>, config: SshConfig) -> Result<Self> {
        if !config.root.starts_with('/') {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(config.root)));
        }
        let binary = match config.ssh_binary {
            Some(binary) => binary,
            None => which::which("ssh")
                .or_raise(|| ErrorKind::InvalidConfig("ssh".to_string(), "no `ssh` binary on PATH".to_string()))?,
        };
        let destination = match config.user {
            Some(user) => format!("{user}@{}", config.host),
            None => config.host,
        };
        Ok(Self {
            name: name.into(),
            binary,
            destination,
            port: config.port,
            root: config.root.trim_end_matches('/').to_string(),
        })
    }

    fn remote_path(&self, path: &Path) -> Result<String> {
        Ok(format!("{}/{}", self.root, to_key(path)?))
    }

    /// Arguments passed to the `ssh` binary to run `script` remotely.
    fn args(&self, script: String) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination.clone());
        args.push("--".to_string());
        args.push(script);
        args
    }

    async fn run(&self, script: String, stdin: Option<&[u8]>) -> Result<Output> {
        tracing::trace!(backend = %self.name, %script, "Running remote command");
        let mut command = Command::new(&self.binary);
        command
            .args(self.args(script))
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(ErrorKind::Io)?;
        if let Some(data) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(data).await.map_err(ErrorKind::Io)?;
            pipe.shutdown().await.map_err(ErrorKind::Io)?;
        }
        Ok(child.wait_with_output().await.map_err(ErrorKind::Io)?)
    }

    fn check(&self, output: Output, path: &Path) -> Result<Vec<u8>> {
        match output.status.code() {
            Some(0) => Ok(output.stdout),
            Some(MISSING_EXIT_CODE) => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            code => exn::bail!(ErrorKind::Network(format!(
                "ssh to {} exited with {code:?}: {}",
                self.destination,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// Quote a string for a POSIX shell.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn parent_of(remote: &str) -> &str {
    remote.rsplit_once('/').map(|(parent, _)| parent).filter(|p| !p.is_empty()).unwrap_or("/")
}

#[async_trait]
impl StorageBackend for SshBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let remote = quote(&self.remote_path(path)?);
        let output = self.run(format!("test -e {remote} || exit {MISSING_EXIT_CODE}"), None).await?;
        match self.check(output, path) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>> {
        let remote = quote(&self.remote_path(path)?);
        let output = self.run(format!("test -f {remote} || exit {MISSING_EXIT_CODE}; cat -- {remote}"), None).await?;
        self.check(output, path)
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<bool> {
        let remote = self.remote_path(path)?;
        let script = format!("mkdir -p -- {} && cat > {}", quote(parent_of(&remote)), quote(&remote));
        let output = self.run(script, Some(data)).await?;
        self.check(output, path)?;
        tracing::debug!(backend = %self.name, path = %path.display(), bytes = data.len(), "Remote file written");
        Ok(true)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let remote = quote(&self.remote_path(path)?);
        let output = self.run(format!("test -f {remote} || exit {MISSING_EXIT_CODE}; rm -f -- {remote}"), None).await?;
        self.check(output, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn backend(user: Option<&str>, port: Option<u16>) -> SshBackend {
        SshBackend::new("remote", SshConfig {
            host: "storage.internal".to_string(),
            user: user.map(str::to_string),
            port,
            root: "/srv/rvs/".to_string(),
            ssh_binary: Some(PathBuf::from("/usr/bin/ssh")),
        })
        .unwrap()
    }

    #[rstest]
    #[case("plain", "'plain'")]
    #[case("with space", "'with space'")]
    #[case("it's", r"'it'\''s'")]
    #[case("$(rm -rf /)", "'$(rm -rf /)'")]
    fn test_quote(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote(input), expected);
    }

    #[test]
    fn test_remote_path() {
        let backend = backend(None, None);
        assert_eq!(backend.remote_path(Path::new("stopwords/V2.0")).unwrap(), "/srv/rvs/stopwords/V2.0");
        assert!(backend.remote_path(Path::new("../../etc/passwd")).is_err());
    }

    #[test]
    fn test_args() {
        let backend = backend(Some("rvs"), Some(2222));
        assert_eq!(backend.args("true".to_string()), vec![
            "-o",
            "BatchMode=yes",
            "-p",
            "2222",
            "rvs@storage.internal",
            "--",
            "true"
        ]);
        assert_eq!(self::backend(None, None).args("true".to_string())[2], "storage.internal");
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/srv/rvs/raw_page/p1.png"), "/srv/rvs/raw_page");
        assert_eq!(parent_of("/p1.png"), "/");
    }

    #[test]
    fn test_relative_root_rejected() {
        let err = SshBackend::new("remote", SshConfig {
            host: "h".to_string(),
            user: None,
            port: None,
            root: "relative".to_string(),
            ssh_binary: Some(PathBuf::from("/usr/bin/ssh")),
        })
        .unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
