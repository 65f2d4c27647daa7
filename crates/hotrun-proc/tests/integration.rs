#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use hotrun_proc::{BuildError, Builder, CommandError, OutputCapture, Stream, Worker, WorkerError};
use tempfile::TempDir;

fn is_alive(pid: u32) -> bool {
	// A zombie has already been killed; it only waits for its parent to reap it.
	match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
		Ok(stat) => !matches!(stat.rsplit(')').next().map(str::trim_start), Some(s) if s.starts_with('Z')),
		Err(_) if Path::new("/proc/self").exists() => false,
		Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok(),
	}
}

async fn wait_dead(pid: u32) -> bool {
	for _ in 0..40 {
		if !is_alive(pid) {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	false
}

// --- Worker: lifecycle ---

#[tokio::test]
async fn worker_run_and_stop() {
	let mut worker = Worker::new("sleep 60", OutputCapture::quiet());
	worker.run().unwrap();

	let pid = worker.pid().unwrap();
	assert!(is_alive(pid));
	assert!(!worker.is_finished());

	worker.stop().await;
	assert!(worker.is_finished());
	assert!(wait_dead(pid).await);
}

#[tokio::test]
async fn worker_stop_after_natural_exit() {
	let mut worker = Worker::new("true", OutputCapture::quiet());
	worker.run().unwrap();
	worker.wait().await;
	assert!(worker.is_finished());

	let stopped = tokio::time::timeout(Duration::from_secs(5), worker.stop()).await;
	assert!(stopped.is_ok(), "stop blocked on an exited process");
}

#[tokio::test]
async fn worker_stop_twice() {
	let mut worker = Worker::new("sleep 60", OutputCapture::quiet());
	worker.run().unwrap();
	worker.stop().await;

	let stopped = tokio::time::timeout(Duration::from_secs(5), worker.stop()).await;
	assert!(stopped.is_ok());
}

#[tokio::test]
async fn worker_stop_never_started() {
	let mut worker = Worker::new("sleep 60", OutputCapture::quiet());
	worker.stop().await;
	assert!(worker.pid().is_none());
	assert!(!worker.is_finished());
}

#[tokio::test]
async fn worker_stop_kills_descendants() {
	let output = OutputCapture::quiet();
	let mut lines = output.subscribe();

	let mut worker = Worker::new("sh -c 'sleep 60 & echo $!; wait'", output);
	worker.run().unwrap();

	let line = tokio::time::timeout(Duration::from_secs(5), lines.recv())
		.await
		.expect("no output from child")
		.unwrap();
	let grandchild: u32 = line.line.trim().parse().unwrap();
	assert!(is_alive(grandchild));

	worker.stop().await;
	assert!(wait_dead(grandchild).await, "grandchild {} survived stop", grandchild);
}

#[tokio::test]
async fn worker_run_twice() {
	let mut worker = Worker::new("sleep 60", OutputCapture::quiet());
	worker.run().unwrap();
	assert!(matches!(worker.run(), Err(WorkerError::AlreadyRunning)));
	worker.stop().await;
}

// --- Worker: output ---

#[tokio::test]
async fn worker_captures_both_streams() {
	let output = OutputCapture::quiet();
	let mut lines = output.subscribe();

	let mut worker = Worker::new("sh -c 'echo to-out; echo to-err >&2'", output);
	worker.run().unwrap();

	let mut seen = Vec::new();
	while seen.len() < 2 {
		let line = tokio::time::timeout(Duration::from_secs(5), lines.recv())
			.await
			.expect("missing output")
			.unwrap();
		seen.push((line.stream, line.line));
	}
	worker.wait().await;

	assert!(seen.contains(&(Stream::Stdout, "to-out".to_string())));
	assert!(seen.contains(&(Stream::Stderr, "to-err".to_string())));
}

// --- Worker: start failures ---

#[tokio::test]
async fn worker_empty_command() {
	let mut worker = Worker::new("  ", OutputCapture::quiet());
	assert!(matches!(worker.run(), Err(WorkerError::Command(CommandError::Empty))));
	assert!(worker.pid().is_none());
}

#[tokio::test]
async fn worker_missing_binary() {
	let mut worker = Worker::new("hotrun-no-such-binary --flag", OutputCapture::quiet());
	assert!(matches!(worker.run(), Err(WorkerError::Spawn { .. })));
}

// --- Builder ---

#[tokio::test]
async fn build_success_leaves_no_log() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("build_error.log");

	let builder = Builder::new("true", &log);
	builder.build().await.unwrap();
	assert!(!log.exists());
}

#[tokio::test]
async fn build_failure_captures_stderr() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("tmp").join("build_error.log");

	let builder = Builder::new("sh -c 'echo compile error: boom >&2; exit 3'", &log);
	let err = builder.build().await.unwrap_err();

	assert!(err.is_failure());
	assert!(err.stderr().unwrap().contains("compile error: boom"));
	let logged = std::fs::read_to_string(&log).unwrap();
	assert!(logged.contains("compile error: boom"));
}

#[tokio::test]
async fn build_removes_stale_log() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("build_error.log");
	let flag = dir.path().join("fixed");

	let command = format!("sh -c 'test -f {} || {{ echo nope >&2; exit 1; }}'", flag.display());
	let builder = Builder::new(command, &log);

	assert!(builder.build().await.is_err());
	assert!(log.exists());

	std::fs::write(&flag, "").unwrap();
	builder.build().await.unwrap();
	assert!(!log.exists());
}

#[tokio::test]
async fn build_unparsable_command_is_failure() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("build_error.log");

	let builder = Builder::new("go build 'unterminated", &log);
	let err = builder.build().await.unwrap_err();

	assert!(matches!(err, BuildError::Failed { .. }));
	assert!(log.exists());
}

#[tokio::test]
async fn build_missing_binary_is_not_failure() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("build_error.log");

	let builder = Builder::new("hotrun-no-such-compiler build", &log);
	let err = builder.build().await.unwrap_err();

	assert!(matches!(err, BuildError::Spawn { .. }));
	assert!(!err.is_failure());
	assert!(!log.exists());
}
