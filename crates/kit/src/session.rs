//! Command sessions on a remote host or guest
//!
//! A [`Session`] runs a shell command line somewhere and hands back the exit
//! status together with the captured output. Timeouts and cancellation belong
//! to the session implementation; callers simply block until it returns.

use std::process::{Command, Output, Stdio};

use camino::Utf8PathBuf;
use color_eyre::{eyre::Context, Result};
use tracing::debug;

/// Exit status and combined stdout/stderr of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
    /// Captured stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            status: output.status.code().unwrap_or(-1),
            output: text,
        }
    }
}

/// Something that can run a shell command line and report how it went
pub trait Session: std::fmt::Debug {
    /// Run `cmd` through the session's shell, blocking until it exits.
    ///
    /// A nonzero exit status is not an error here; only failing to run the
    /// command at all is.
    fn cmd_status_output(&self, cmd: &str) -> Result<CommandOutput>;
}

/// A session over the system `ssh` client
#[derive(Debug, Clone)]
pub struct SshSession {
    /// Host name or address
    pub host: String,
    /// Remote user; the ssh default applies when unset
    pub user: Option<String>,
    /// Remote port
    pub port: Option<u16>,
    /// Private key file
    pub identity: Option<Utf8PathBuf>,
    /// Connection timeout in seconds
    pub connect_timeout: u32,
    /// Verify the remote host key against known_hosts
    pub strict_host_keys: bool,
}

impl SshSession {
    /// A session to `host` with default options
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_owned(),
            user: None,
            port: None,
            identity: None,
            connect_timeout: 30,
            strict_host_keys: false,
        }
    }

    fn destination(&self) -> String {
        match self.user {
            Some(ref user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Build the `ssh` invocation for a remote command line
    pub(crate) fn ssh_command(&self, cmd: &str) -> Command {
        let mut ssh = Command::new("ssh");
        ssh.args(["-o", "BatchMode=yes"]);
        ssh.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout));
        if !self.strict_host_keys {
            ssh.args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "LogLevel=ERROR",
            ]);
        }
        if let Some(port) = self.port {
            ssh.arg("-p").arg(port.to_string());
        }
        if let Some(ref identity) = self.identity {
            ssh.arg("-i").arg(identity.as_str());
        }
        ssh.arg(self.destination());
        ssh.arg("--");
        ssh.arg(cmd);
        ssh.stdin(Stdio::null());
        ssh
    }
}

impl Session for SshSession {
    fn cmd_status_output(&self, cmd: &str) -> Result<CommandOutput> {
        debug!(host = %self.host, cmd, "Running remote command");
        let output = self
            .ssh_command(cmd)
            .output()
            .with_context(|| format!("Failed to run ssh to {}", self.host))?;
        Ok(output.into())
    }
}

/// A session on the local host through `sh -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSession;

impl Session for LocalSession {
    fn cmd_status_output(&self, cmd: &str) -> Result<CommandOutput> {
        debug!(cmd, "Running local command");
        let output = Command::new("sh")
            .args(["-c", cmd])
            .stdin(Stdio::null())
            .output()
            .context("Failed to run sh")?;
        Ok(output.into())
    }
}
