//! Process-group signalling for supervised children.
//!
//! Mocks and tests are spawned as leaders of their own process group so a
//! shell wrapper cannot leave an orphaned listener behind: signals go to
//! the whole group.

use tokio::process::Command;

/// Signal to deliver to a child's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupSignal {
    Terminate,
    Kill,
}

/// Make the spawned child the leader of a new process group.
pub(crate) fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Send `signal` to the process group led by `pid`.
///
/// Returns `true` if the signal was delivered. A group that no longer
/// exists is not an error.
#[cfg(unix)]
pub(crate) fn signal_group(pid: Option<u32>, signal: GroupSignal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => {
            tracing::warn!(pid, ?signal, error = %err, "failed to signal process group");
            false
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pid: Option<u32>, _signal: GroupSignal) -> bool {
    false
}
