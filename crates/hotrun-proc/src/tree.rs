//! Platform-specific handling of a child and everything it spawns.
//!
//! On Unix the child leads its own process group and the group is signaled
//! with `killpg`. On Windows the child gets a new process group and the tree
//! is enumerated and killed by `taskkill /T`.

use tokio::process::Command;

pub trait ProcessTree {
	/// Configure `cmd` so the spawned process and its descendants can be
	/// addressed as a unit.
	fn prepare(cmd: &mut Command);

	/// Ask every process in the tree rooted at `pid` to terminate.
	fn terminate(pid: u32);

	/// Forcibly kill whatever is left of the tree rooted at `pid`.
	fn kill(pid: u32);
}

#[cfg(unix)]
pub type PlatformTree = unix::ProcessGroup;

#[cfg(windows)]
pub type PlatformTree = windows::TaskTree;

#[cfg(unix)]
pub mod unix {
	use nix::errno::Errno;
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;
	use tokio::process::Command;

	pub struct ProcessGroup;

	impl ProcessGroup {
		fn signal(pid: u32, signal: Signal) {
			// pgid 0 would address our own group
			if pid == 0 {
				return;
			}
			let pgid = Pid::from_raw(pid as i32);
			match killpg(pgid, signal) {
				Ok(()) | Err(Errno::ESRCH) => {}
				Err(e) => tracing::debug!("killpg {} {:?}: {}", pid, signal, e),
			}
		}
	}

	impl super::ProcessTree for ProcessGroup {
		fn prepare(cmd: &mut Command) {
			cmd.process_group(0);
		}

		fn terminate(pid: u32) {
			Self::signal(pid, Signal::SIGTERM);
		}

		fn kill(pid: u32) {
			Self::signal(pid, Signal::SIGKILL);
		}
	}
}

#[cfg(windows)]
pub mod windows {
	use std::process::Stdio;
	use tokio::process::Command;

	const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

	pub struct TaskTree;

	impl TaskTree {
		fn taskkill(pid: u32, force: bool) {
			let mut cmd = std::process::Command::new("taskkill");
			cmd.arg("/T");
			if force {
				cmd.arg("/F");
			}
			cmd.args(["/PID", &pid.to_string()])
				.stdout(Stdio::null())
				.stderr(Stdio::null());
			if let Err(e) = cmd.status() {
				tracing::debug!("taskkill {}: {}", pid, e);
			}
		}
	}

	impl super::ProcessTree for TaskTree {
		fn prepare(cmd: &mut Command) {
			cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
		}

		fn terminate(pid: u32) {
			Self::taskkill(pid, false);
		}

		fn kill(pid: u32) {
			Self::taskkill(pid, true);
		}
	}
}
