//! # Process Runner
//!
//! The token adapter never spawns processes itself. It describes each
//! invocation as a [`ProcessCommand`] and hands it to a [`ProcessRunner`],
//! so tests can substitute a fake for real hardware.
//!
//! ```text
//! Pkcs11Token ──► ProcessCommand ──► ProcessRunner::run ──► ProcessOutput
//!                                          │
//!                      ┌───────────────────┴───────────────────┐
//!                      ▼                                       ▼
//!               SystemRunner                            test fakes
//!        (tokio::process + timeout)              (spy, simulated token)
//! ```
//!
//! Command lines are only ever logged or attached to errors through
//! [`ProcessCommand::display`], which masks PIN values.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Flags whose following argument is a secret
const SECRET_FLAGS: [&str; 2] = ["--pin", "--so-pin"];

/// URI attribute holding a PIN
const PIN_ATTRIBUTE: &str = "pin-value=";

const MASK: &str = "****";

/// One external program invocation
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ProcessCommand {
    /// Start a command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value following `flag`, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// True if `flag` appears as an argument
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Command line with PIN values masked
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(redact_args(&self.args));
        parts.join(" ")
    }
}

impl std::fmt::Debug for ProcessCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Mask the values of `--pin`, `--so-pin` and `pin-value=` attributes.
pub fn redact_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;

    for arg in args {
        if mask_next {
            out.push(MASK.to_string());
            mask_next = false;
            continue;
        }

        if SECRET_FLAGS.contains(&arg.as_str()) {
            mask_next = true;
            out.push(arg.clone());
        } else if let Some(flag) = SECRET_FLAGS
            .iter()
            .find(|flag| arg.starts_with(&format!("{}=", flag)))
        {
            out.push(format!("{}={}", flag, MASK));
        } else if arg.contains(PIN_ATTRIBUTE) {
            out.push(redact_pin_attribute(arg));
        } else {
            out.push(arg.clone());
        }
    }

    out
}

fn redact_pin_attribute(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(start) = rest.find(PIN_ATTRIBUTE) {
        let value_start = start + PIN_ATTRIBUTE.len();
        out.push_str(&rest[..value_start]);
        out.push_str(MASK);
        rest = &rest[value_start..];
        rest = match rest.find([';', '&']) {
            Some(end) => &rest[end..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True for a zero exit code
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Capability to run an external program and capture its output
///
/// A non-zero exit is not an error at this level; callers inspect
/// [`ProcessOutput::status`]. Errors are reserved for processes that could
/// not be started or did not finish in time.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput>;
}

/// Runs commands with `tokio::process`, killing them after a deadline
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    /// Create a runner that gives each process `timeout` to finish
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        tracing::debug!(command = %command.display(), "Running external tool");

        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, child.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::ProcessSpawn {
                    command: command.program.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    command = %command.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "External tool timed out"
                );
                return Err(Error::Timeout {
                    command: command.display(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_redact_pin_flags() {
        let args = strings(&["--module", "m.so", "--pin", "1234", "--so-pin", "87654321", "-O"]);
        assert_eq!(
            redact_args(&args),
            strings(&["--module", "m.so", "--pin", "****", "--so-pin", "****", "-O"])
        );
    }

    #[test]
    fn test_redact_inline_flag() {
        let args = strings(&["--pin=1234"]);
        assert_eq!(redact_args(&args), strings(&["--pin=****"]));
    }

    #[test]
    fn test_redact_uri_pin() {
        let args = strings(&["-inkey", "pkcs11:token=T;object=K;type=private;pin-value=1234"]);
        let redacted = redact_args(&args);
        assert_eq!(redacted[1], "pkcs11:token=T;object=K;type=private;pin-value=****");

        let args = strings(&["pkcs11:pin-value=9999;token=T"]);
        assert_eq!(redact_args(&args)[0], "pkcs11:pin-value=****;token=T");
    }

    #[test]
    fn test_display_masks_secrets() {
        let command = ProcessCommand::new("pkcs11-tool")
            .args(["--module", "m.so", "--login", "--pin", "secret-pin"])
            .arg("-O");
        let display = command.display();
        assert!(!display.contains("secret-pin"));
        assert_eq!(display, "pkcs11-tool --module m.so --login --pin **** -O");
        assert_eq!(format!("{:?}", command), display);
    }

    #[test]
    fn test_flag_lookup() {
        let command = ProcessCommand::new("pkcs11-tool").args(["--label", "MyKey", "--usage-sign"]);
        assert_eq!(command.flag_value("--label"), Some("MyKey"));
        assert_eq!(command.flag_value("--usage-sign"), None);
        assert!(command.has_flag("--usage-sign"));
        assert!(!command.has_flag("--usage-decrypt"));
    }

    #[test]
    fn test_combined_output() {
        let output = ProcessOutput {
            status: Some(1),
            stdout: "partial\n".into(),
            stderr: "error: boom".into(),
        };
        assert_eq!(output.combined(), "partial\nerror: boom");
        assert!(!output.success());
        assert_eq!(ProcessOutput::ok("x").combined(), "x");
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner
            .run(&ProcessCommand::new("definitely-not-a-real-program-4f2a"))
            .await;
        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let output = runner
            .run(&ProcessCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let result = runner.run(&ProcessCommand::new("sleep").arg("5")).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}
