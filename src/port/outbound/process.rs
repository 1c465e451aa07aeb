//! Process launching port.
//!
//! Defines how the orchestrator spawns a child process and later signals
//! it. Exit is observed through a watch channel fed by the adapter's
//! reaper, so any number of waiters can see it without owning the child.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tokio::sync::watch;

use crate::domain::ServiceDescriptor;

/// Everything needed to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Service name, used for log fields.
    pub service: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    /// Variables added on top of the supervisor's own environment.
    pub env: BTreeMap<String, String>,
}

impl From<&ServiceDescriptor> for LaunchSpec {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            service: descriptor.name().to_string(),
            program: descriptor.executable().to_string(),
            args: descriptor.arguments().to_vec(),
            working_directory: descriptor.working_directory().clone(),
            env: descriptor.env().clone(),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit status, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed.
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// A normal exit with `code`.
    #[must_use]
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by `signal`.
    #[must_use]
    pub const fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit"),
        }
    }
}

/// Spawns managed processes.
///
/// Implementations must be thread-safe (`Send + Sync`); the orchestrator
/// holds one behind an `Arc`.
pub trait ProcessLauncher: Send + Sync {
    /// Start a process described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the executable cannot be started
    /// (missing, not executable, bad working directory).
    fn spawn(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ManagedProcess>>;
}

/// A running (or finished) child process.
pub trait ManagedProcess: Send + Sync {
    fn pid(&self) -> u32;

    /// Ask the process, and its process group, to shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns the OS error from signal delivery. A process that is
    /// already gone is not an error.
    fn terminate(&self) -> std::io::Result<()>;

    /// Force the process, and its process group, to stop.
    ///
    /// # Errors
    ///
    /// Same as [`terminate`](Self::terminate).
    fn kill(&self) -> std::io::Result<()>;

    /// Receiver that holds `Some(exit)` once the process has been reaped.
    fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>>;

    /// Exit status if the process has already been reaped.
    fn try_exit(&self) -> Option<ProcessExit> {
        let rx = self.exit_watch();
        let exit = *rx.borrow();
        exit
    }
}

/// Wait until `rx` reports an exit. Returns `None` if the reaper went away
/// without reporting one.
pub async fn wait_for_exit(mut rx: watch::Receiver<Option<ProcessExit>>) -> Option<ProcessExit> {
    let exit = rx.wait_for(Option::is_some).await.ok().and_then(|exit| *exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceName;

    #[test]
    fn exit_display() {
        assert_eq!(ProcessExit::code(3).to_string(), "exit code 3");
        assert_eq!(ProcessExit::signal(9).to_string(), "signal 9");
        assert!(ProcessExit::code(0).success());
        assert!(!ProcessExit::signal(15).success());
    }

    #[test]
    fn launch_spec_from_descriptor() {
        let descriptor = ServiceDescriptor::new(
            ServiceName::try_new("api").unwrap(),
            "/srv/api",
            "python",
            vec!["-m".into(), "uvicorn".into()],
        )
        .with_env("PORT", "8000");
        let spec = LaunchSpec::from(&descriptor);
        assert_eq!(spec.service, "api");
        assert_eq!(spec.program, "python");
        assert_eq!(spec.args, vec!["-m", "uvicorn"]);
        assert_eq!(spec.env["PORT"], "8000");
    }

    #[tokio::test]
    async fn wait_for_exit_sees_published_exit() {
        let (tx, rx) = watch::channel(None);
        let waiter = tokio::spawn(wait_for_exit(rx));
        tx.send_replace(Some(ProcessExit::code(1)));
        assert_eq!(waiter.await.unwrap(), Some(ProcessExit::code(1)));
    }

    #[tokio::test]
    async fn wait_for_exit_returns_none_when_sender_dropped() {
        let (tx, rx) = watch::channel(None);
        drop(tx);
        assert_eq!(wait_for_exit(rx).await, None);
    }
}
