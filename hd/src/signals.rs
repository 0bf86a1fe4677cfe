//! Signal controller
//!
//! OS signals are received on a dedicated task and turned into flags the
//! control loop reads between steps:
//!
//! - SIGHUP sets a sticky reload flag, consumed once per tick
//! - SIGTERM / SIGINT set the terminate flag and wake every task parked in
//!   [`SignalController::terminated`]
//! - SIGCHLD reaps finished child processes
//!
//! Nothing else runs in response to a signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use eyre::{Context, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sticky reload/terminate flags shared between the signal task and the loop
#[derive(Debug)]
pub struct SignalController {
    reload: AtomicBool,
    terminate: watch::Sender<bool>,
}

impl SignalController {
    pub fn new() -> Arc<Self> {
        let (terminate, _) = watch::channel(false);
        Arc::new(Self {
            reload: AtomicBool::new(false),
            terminate,
        })
    }

    /// Mark a configuration reload as pending
    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::Release);
    }

    /// Consume the pending reload, if any
    ///
    /// Any number of requests since the last call collapse into one `true`.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::AcqRel)
    }

    /// Request termination
    ///
    /// Returns true only for the request that flipped the flag.
    pub fn request_terminate(&self) -> bool {
        self.terminate.send_if_modified(|terminated| {
            if *terminated {
                false
            } else {
                *terminated = true;
                true
            }
        })
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminate.borrow()
    }

    /// Resolves once termination has been requested (immediately if it already was)
    pub async fn terminated(&self) {
        let mut rx = self.terminate.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    fn on_terminate(&self, signal: &str) {
        if self.request_terminate() {
            info!(signal, "Termination requested");
        } else {
            debug!(signal, "Termination already requested, ignoring");
        }
    }

    /// Install the signal listeners
    ///
    /// Must be called from within a tokio runtime. The returned task runs
    /// until aborted.
    pub fn install(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigchld = signal(SignalKind::child()).context("Failed to install SIGCHLD handler")?;

        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = sighup.recv() => {
                        debug!("SIGHUP received");
                        controller.request_reload();
                    }
                    Some(()) = sigterm.recv() => controller.on_terminate("SIGTERM"),
                    Some(()) = sigint.recv() => controller.on_terminate("SIGINT"),
                    Some(()) = sigchld.recv() => {
                        reap_children();
                    }
                    else => break,
                }
            }
        });
        debug!("Signal handlers installed");
        Ok(handle)
    }
}

/// Subprocess calls whose exit status someone is waiting for
static SUBPROCESSES_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// A reaper pass is running
static REAPING: AtomicBool = AtomicBool::new(false);

/// Keeps the reaper away while a tracked subprocess call is running
#[derive(Debug)]
pub struct SubprocessGuard(());

impl Drop for SubprocessGuard {
    fn drop(&mut self) {
        SUBPROCESSES_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mark a subprocess call as in flight until the guard is dropped
///
/// Waits out a reaper pass that started before the call was registered,
/// so the child is never spawned under a running `waitpid(-1)` loop. The
/// wait yields to the runtime instead of holding the worker thread.
pub async fn track_subprocess() -> SubprocessGuard {
    SUBPROCESSES_IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let guard = SubprocessGuard(());
    while REAPING.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }
    guard
}

/// Collect exit statuses of finished children without blocking
///
/// Returns how many children were reaped. Skipped while a tracked
/// subprocess call is in flight or another pass is running.
pub fn reap_children() -> usize {
    if REAPING.swap(true, Ordering::SeqCst) {
        return 0;
    }
    let reaped = if SUBPROCESSES_IN_FLIGHT.load(Ordering::SeqCst) > 0 {
        debug!("reap_children: subprocess in flight, skipping");
        0
    } else {
        reap_all()
    };
    REAPING.store(false, Ordering::SeqCst);
    reaped
}

fn reap_all() -> usize {
    let mut reaped = 0;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                reaped += 1;
                debug!(?status, "Reaped child process");
            }
            Err(Errno::ECHILD) => break,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
    reaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reload_coalesces() {
        let signals = SignalController::new();
        assert!(!signals.take_reload());

        for _ in 0..5 {
            signals.request_reload();
        }
        assert!(signals.take_reload());
        assert!(!signals.take_reload());
    }

    #[test]
    fn test_terminate_is_sticky_and_idempotent() {
        let signals = SignalController::new();
        assert!(!signals.is_terminated());

        assert!(signals.request_terminate());
        assert!(!signals.request_terminate());
        assert!(!signals.request_terminate());
        assert!(signals.is_terminated());
    }

    #[tokio::test]
    async fn test_terminated_resolves_immediately_when_set() {
        let signals = SignalController::new();
        signals.request_terminate();
        tokio::time::timeout(Duration::from_millis(100), signals.terminated())
            .await
            .expect("terminated() should resolve at once");
    }

    #[tokio::test]
    async fn test_terminated_wakes_waiter() {
        let signals = SignalController::new();
        let waiter = {
            let signals = Arc::clone(&signals);
            tokio::spawn(async move { signals.terminated().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        signals.request_terminate();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_terminated_wakes_on_sigterm() {
        let signals = SignalController::new();
        let handle = signals.install().unwrap();

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();
        tokio::time::timeout(Duration::from_secs(2), signals.terminated())
            .await
            .expect("SIGTERM should request termination");
        assert!(signals.is_terminated());
        handle.abort();
    }

    #[tokio::test]
    async fn test_reaper_skips_while_tracked() {
        let guard = track_subprocess().await;
        assert_eq!(reap_children(), 0);
        drop(guard);
    }

    #[tokio::test]
    async fn test_tracking_waits_out_reaper_pass() {
        REAPING.store(true, Ordering::SeqCst);
        let waiter = tokio::spawn(track_subprocess());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished(), "guard handed out during a reaper pass");

        REAPING.store(false, Ordering::SeqCst);
        let guard = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("guard after the pass ends")
            .unwrap();
        drop(guard);
    }

    #[test]
    fn test_reaper_collects_zombie() {
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        drop(child);

        // A zombie still answers kill(pid, 0); a reaped child does not
        let mut gone = false;
        for _ in 0..100 {
            std::thread::sleep(Duration::from_millis(20));
            reap_children();
            if nix::sys::signal::kill(pid, None) == Err(Errno::ESRCH) {
                gone = true;
                break;
            }
        }
        assert!(gone, "child {} was never reaped", pid);
    }
}
