//! Unix process launcher.
//!
//! Every child is started as the leader of a new session (`setsid`) so that
//! signals can be delivered to the whole process group, including any
//! workers the service forks. Output is forwarded line by line into
//! `tracing` and a reaper task publishes the exit status.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;

use libc::{killpg, setsid, SIGKILL, SIGTERM};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::port::outbound::process::{LaunchSpec, ManagedProcess, ProcessExit, ProcessLauncher};

/// Launches services as process-group leaders.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessLauncher;

impl UnixProcessLauncher {
    /// A launcher for local child processes.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// A relative program path with a separator is taken relative to the
/// working directory; bare names are looked up on `PATH`.
fn resolve_program(spec: &LaunchSpec) -> PathBuf {
    let program = PathBuf::from(&spec.program);
    if program.is_relative() && spec.program.contains('/') {
        spec.working_directory.join(program)
    } else {
        program
    }
}

impl ProcessLauncher for UnixProcessLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ManagedProcess>> {
        let mut cmd = Command::new(resolve_program(spec));
        cmd.args(&spec.args)
            .current_dir(&spec.working_directory)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("pid not available"))?;
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(spec.service.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(spec.service.clone(), "stderr", stderr));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let service = spec.service.clone();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ProcessExit {
                    code: status.code(),
                    signal: status.signal(),
                },
                Err(e) => {
                    warn!(service = %service, error = %e, "Failed to reap child");
                    ProcessExit {
                        code: None,
                        signal: None,
                    }
                }
            };
            debug!(service = %service, pid, %exit, "Child reaped");
            exit_tx.send_replace(Some(exit));
        });

        info!(service = %spec.service, pid, program = %spec.program, "Spawned");
        Ok(Box::new(UnixProcess {
            pid,
            pgid,
            exit: exit_rx,
        }))
    }
}

async fn pump<R>(service: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "runall::child", service = %service, stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(service = %service, stream, error = %e, "Output stream closed");
                break;
            }
        }
    }
}

/// Handle to a child started by [`UnixProcessLauncher`].
#[derive(Debug)]
pub struct UnixProcess {
    pid: u32,
    pgid: libc::pid_t,
    exit: watch::Receiver<Option<ProcessExit>>,
}

impl UnixProcess {
    fn signal_group(&self, signal: libc::c_int) -> std::io::Result<()> {
        #[allow(unsafe_code)]
        let rc = unsafe { killpg(self.pgid, signal) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

impl ManagedProcess for UnixProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn terminate(&self) -> std::io::Result<()> {
        self.signal_group(SIGTERM)
    }

    fn kill(&self) -> std::io::Result<()> {
        self.signal_group(SIGKILL)
    }

    fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit.clone()
    }
}

/// Whether a process with `pid` exists.
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send `SIGTERM` to a single process.
///
/// # Errors
///
/// Returns the OS error from `kill(2)`.
pub fn request_termination(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))?;
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
