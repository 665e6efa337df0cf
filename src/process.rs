//! Process-group lifecycle for spawned tool children.
//!
//! Every tool invocation runs in its own process group so cancellation can
//! tear down the whole tree; agent CLIs routinely shell out further, and
//! killing only the direct child would orphan those grandchildren. A
//! background watcher waits on the run's cancellation token and escalates:
//! graceful group terminate, short grace window, then a forced kill.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace window between group SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(100);

/// Handle for one spawned child and its process group.
///
/// Owned by the executor call that spawned it; all cross-task handoffs
/// rendezvous in [`GroupGuard::wait`].
pub struct GroupGuard {
    child: Child,
    group: Option<i32>,
    status: Option<ExitStatus>,
    done: CancellationToken,
}

/// Spawn `cmd` in its own process group and arm the cancellation watcher.
///
/// The watcher task waits on `cancel` against a private completion token;
/// it escalates only on cancellation and never polls.
pub fn spawn_group(cmd: &mut Command, cancel: &CancellationToken) -> std::io::Result<GroupGuard> {
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let group = child.id().map(|id| id as i32);

    let done = CancellationToken::new();
    let watcher_cancel = cancel.clone();
    let watcher_done = done.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher_cancel.cancelled() => {
                if let Some(group) = group {
                    terminate_group(group).await;
                }
            }
            _ = watcher_done.cancelled() => {}
        }
    });

    Ok(GroupGuard {
        child,
        group,
        status: None,
        done,
    })
}

impl GroupGuard {
    /// Mutable access to the child, for taking its stdio pipes.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Process-group id, when the child was still alive at spawn time.
    pub fn group_id(&self) -> Option<i32> {
        self.group
    }

    /// Await child exit.
    ///
    /// Idempotent: the first successful call caches the exit status and
    /// retires the watcher; later calls return the cached status without
    /// running any cleanup again.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        self.done.cancel();
        Ok(status)
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        // Retire the watcher even when wait() was never reached.
        self.done.cancel();
    }
}

/// Terminate a whole process group, escalating from graceful to forced.
///
/// "Already gone" is not an error at either step.
#[cfg(unix)]
async fn terminate_group(group: i32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(group);
    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => debug!(group, "sent SIGTERM to process group"),
        Err(Errno::ESRCH) => return,
        Err(e) => warn!(group, error = %e, "failed to SIGTERM process group"),
    }

    tokio::time::sleep(TERM_GRACE).await;

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => debug!(group, "sent SIGKILL to process group"),
        // Exited within the grace window
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(group, error = %e, "failed to SIGKILL process group"),
    }
}

#[cfg(windows)]
async fn terminate_group(group: i32) {
    // taskkill /T takes the whole tree down; windows has no graceful step
    let result = tokio::process::Command::new("taskkill")
        .args(["/PID", &group.to_string(), "/T", "/F"])
        .output()
        .await;
    match result {
        Ok(output) if !output.status.success() => {
            warn!(group, "taskkill reported failure");
        }
        Ok(_) => debug!(group, "terminated process tree via taskkill"),
        Err(e) => warn!(group, error = %e, "failed to run taskkill"),
    }
}
