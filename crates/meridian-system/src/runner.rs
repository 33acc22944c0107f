//! Command execution seam.
//!
//! The kernel plans package-manager commands; running them belongs to an
//! external collaborator. [`CommandRunner`] is that boundary: production
//! wires in [`SystemRunner`], tests inject fakes.

use std::io;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// Executes planned commands and inspects processes on behalf of the
/// registry and the dependency manager.
pub trait CommandRunner: Send + Sync {
    /// Run a shell command and capture its stdout.
    ///
    /// # Errors
    /// Returns the underlying IO error when the command cannot be spawned,
    /// or an error when it exits non-zero.
    fn run(&self, command: &str) -> io::Result<String>;

    /// Whether an executable of this name is on the `PATH`.
    fn binary_exists(&self, name: &str) -> bool;

    /// PIDs of running processes whose name matches.
    fn processes_matching(&self, name: &str) -> Vec<u32>;

    /// Ask a process to stop; escalate to a forced kill after the grace
    /// period when it is still alive.
    fn terminate(&self, pid: u32, grace: Duration);
}

/// Default runner backed by the system shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &str) -> io::Result<String> {
        debug!(command, "running command");
        let output = if cfg!(windows) {
            Command::new("cmd").args(["/C", command]).output()?
        } else {
            Command::new("sh").args(["-c", command]).output()?
        };
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "command '{command}' exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn binary_exists(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn processes_matching(&self, name: &str) -> Vec<u32> {
        let listing = if cfg!(windows) {
            self.run(&format!("tasklist /FI \"IMAGENAME eq {name}.exe\" /FO CSV /NH"))
        } else {
            self.run(&format!("pgrep -f {name}"))
        };
        match listing {
            Ok(output) => output
                .lines()
                .filter_map(|line| line.trim().parse::<u32>().ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn terminate(&self, pid: u32, grace: Duration) {
        #[cfg(unix)]
        {
            if self.run(&format!("kill -TERM {pid}")).is_err() {
                warn!(pid, "failed to signal process");
                return;
            }
            std::thread::sleep(grace);
            // Still alive after the grace period: force it.
            if self.run(&format!("kill -0 {pid}")).is_ok() {
                let _ = self.run(&format!("kill -KILL {pid}"));
            }
        }
        #[cfg(windows)]
        {
            let _ = grace;
            if self.run(&format!("taskkill /F /PID {pid}")).is_err() {
                warn!(pid, "failed to terminate process");
            }
        }
    }
}
