//! Recursive directory watching with pattern filtering.
//!
//! Every directory under the roots gets its own non-recursive OS watch, so
//! hidden and ignored directories are never registered at all. Directories
//! created later are walked and registered as their creation events arrive.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use globset::{Glob, GlobMatcher};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
	pub path: PathBuf,
	pub kind: EventKind,
}

#[derive(Debug, Error)]
pub enum WatchError {
	#[error("watcher already started")]
	AlreadyStarted,
	#[error("invalid watch pattern {pattern:?}: {source}")]
	Pattern {
		pattern: String,
		#[source]
		source: globset::Error,
	},
	#[error("cannot initialize file watcher: {0}")]
	Init(#[source] notify::Error),
	#[error("cannot watch {}: {source}", .path.display())]
	Watch {
		path: PathBuf,
		#[source]
		source: notify::Error,
	},
	#[error("cannot walk {}: {source}", .path.display())]
	Walk {
		path: PathBuf,
		#[source]
		source: walkdir::Error,
	},
}

pub struct Watcher {
	inner: Arc<Inner>,
}

struct Inner {
	roots: Vec<PathBuf>,
	ignored: HashSet<String>,
	patterns: Vec<String>,
	state: Mutex<State>,
	listeners: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

#[derive(Default)]
struct State {
	os: Option<RecommendedWatcher>,
	matchers: Vec<GlobMatcher>,
	watched: BTreeSet<PathBuf>,
	event_loop: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Watcher {
	pub fn new(
		dirs: impl IntoIterator<Item = impl Into<PathBuf>>,
		ignored: impl IntoIterator<Item = impl Into<String>>,
		patterns: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		let mut roots: Vec<PathBuf> = Vec::new();
		for dir in dirs {
			let dir = dir.into();
			if !roots.contains(&dir) {
				roots.push(dir);
			}
		}

		let mut unique_patterns: Vec<String> = Vec::new();
		for pattern in patterns {
			let pattern = pattern.into();
			if !unique_patterns.contains(&pattern) {
				unique_patterns.push(pattern);
			}
		}

		Self {
			inner: Arc::new(Inner {
				roots,
				ignored: ignored.into_iter().map(|s| s.into().trim().to_string()).collect(),
				patterns: unique_patterns,
				state: Mutex::new(State::default()),
				listeners: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Register watches on every root and start dispatching events.
	///
	/// On error nothing stays registered.
	pub fn start(&self) -> Result<(), WatchError> {
		let mut state = lock(&self.inner.state);
		if state.os.is_some() {
			return Err(WatchError::AlreadyStarted);
		}

		tracing::debug!("watcher: starting");
		state.matchers = compile_patterns(&self.inner.patterns)?;

		let (tx, rx) = mpsc::unbounded_channel();
		let os = notify::recommended_watcher(move |res: notify::Result<Event>| {
			let _ = tx.send(res);
		})
		.map_err(WatchError::Init)?;
		state.os = Some(os);

		for root in &self.inner.roots {
			if let Err(e) = self.inner.add_recursive(&mut state, root, true) {
				teardown(&mut state);
				return Err(e);
			}
		}

		let inner = Arc::clone(&self.inner);
		state.event_loop = Some(tokio::spawn(async move {
			inner.watch_loop(rx).await;
		}));

		Ok(())
	}

	/// Register a callback for every matching event.
	///
	/// Each listener has its own queue and task: listeners run independently
	/// of each other, and each one sees events in the order they happened.
	pub fn add_listener<F>(&self, listener: F)
	where
		F: Fn(ChangeEvent) + Send + 'static,
	{
		let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();
		tokio::spawn(async move {
			while let Some(event) = rx.recv().await {
				listener(event);
			}
		});
		lock(&self.inner.listeners).push(tx);
	}

	/// Release every OS watch and end the listener tasks. Calling it again is
	/// a no-op.
	pub fn stop(&self) -> Result<(), WatchError> {
		let mut state = lock(&self.inner.state);
		if state.os.is_none() {
			return Ok(());
		}

		tracing::debug!("watcher: stopping");
		teardown(&mut state);
		lock(&self.inner.listeners).clear();
		Ok(())
	}

	pub fn listener_count(&self) -> usize {
		lock(&self.inner.listeners).len()
	}

	pub fn is_running(&self) -> bool {
		lock(&self.inner.state).os.is_some()
	}

	pub fn watched_dirs(&self) -> Vec<PathBuf> {
		lock(&self.inner.state).watched.iter().cloned().collect()
	}
}

impl Drop for Watcher {
	fn drop(&mut self) {
		teardown(&mut lock(&self.inner.state));
		lock(&self.inner.listeners).clear();
	}
}

fn teardown(state: &mut State) {
	state.os = None;
	state.watched.clear();
	if let Some(handle) = state.event_loop.take() {
		handle.abort();
	}
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<GlobMatcher>, WatchError> {
	patterns
		.iter()
		.map(|pattern| {
			Glob::new(pattern)
				.map(|glob| glob.compile_matcher())
				.map_err(|source| WatchError::Pattern {
					pattern: pattern.clone(),
					source,
				})
		})
		.collect()
}

impl Inner {
	async fn watch_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>) {
		while let Some(res) = rx.recv().await {
			match res {
				Ok(event) => self.handle_event(event),
				Err(e) => tracing::warn!("watch error: {}", e),
			}
		}
	}

	fn handle_event(&self, event: Event) {
		tracing::debug!("watcher: handling event {:?}", event);

		let matched = {
			let mut state = lock(&self.state);
			if state.os.is_none() {
				return;
			}

			match event.kind {
				EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) => {
					for path in &event.paths {
						if path.is_dir() {
							if let Err(e) = self.add_recursive(&mut state, path, false) {
								tracing::warn!("{}", e);
							}
						} else if !path.exists() {
							forget(&mut state, path);
						}
					}
				}
				EventKind::Remove(_) => {
					for path in &event.paths {
						forget(&mut state, path);
					}
				}
				_ => {}
			}

			event
				.paths
				.iter()
				.find(|path| self.file_matches(&state.matchers, path))
				.cloned()
		};

		let Some(path) = matched else {
			return;
		};

		tracing::debug!("watcher: file matching pattern {}", path.display());
		let change = ChangeEvent {
			path,
			kind: event.kind,
		};
		lock(&self.listeners).retain(|listener| listener.send(change.clone()).is_ok());
	}

	/// Walk `dir` and watch every directory in it. Only a configured root may
	/// itself be hidden.
	fn add_recursive(&self, state: &mut State, dir: &Path, root: bool) -> Result<(), WatchError> {
		let walker = WalkDir::new(dir)
			.follow_links(false)
			.into_iter()
			.filter_entry(|entry| {
				entry.file_type().is_dir() && !self.skip_dir(entry.path(), root && entry.depth() == 0)
			});

		for entry in walker {
			let entry = entry.map_err(|source| WatchError::Walk {
				path: dir.to_path_buf(),
				source,
			})?;
			let path = entry.path();
			if state.watched.contains(path) {
				continue;
			}

			let Some(os) = state.os.as_mut() else {
				return Ok(());
			};
			tracing::debug!("watcher: watching {}", path.display());
			os.watch(path, RecursiveMode::NonRecursive)
				.map_err(|source| WatchError::Watch {
					path: path.to_path_buf(),
					source,
				})?;
			state.watched.insert(path.to_path_buf());
		}

		Ok(())
	}

	fn skip_dir(&self, path: &Path, is_root: bool) -> bool {
		if !is_root && is_hidden(path) {
			return true;
		}
		if self.is_ignored(path) {
			tracing::debug!("watcher: ignoring {}", path.display());
			return true;
		}
		false
	}

	fn is_ignored(&self, path: &Path) -> bool {
		self.ignored.iter().filter(|e| !e.is_empty()).any(|entry| {
			let entry = Path::new(entry);
			path == entry
				|| path.file_name() == Some(entry.as_os_str())
				|| self
					.roots
					.iter()
					.any(|root| path.strip_prefix(root).map(|rel| rel == entry).unwrap_or(false))
		})
	}

	fn file_matches(&self, matchers: &[GlobMatcher], path: &Path) -> bool {
		let full = path.to_string_lossy();
		if self.patterns.iter().any(|pattern| *pattern == full) {
			return true;
		}

		match path.file_name() {
			Some(name) => matchers.iter().any(|m| m.is_match(name)),
			None => false,
		}
	}
}

fn is_hidden(path: &Path) -> bool {
	path.file_name()
		.map(|name| name.to_string_lossy().starts_with('.'))
		.unwrap_or(false)
}

/// Drop bookkeeping for a directory that no longer exists; the OS watch went
/// with it.
fn forget(state: &mut State, path: &Path) {
	state.watched.retain(|watched| !watched.starts_with(path));
}

#[cfg(test)]
mod tests {
	use super::*;

	fn inner(roots: &[&str], ignored: &[&str], patterns: &[&str]) -> Arc<Inner> {
		Watcher::new(roots.iter().copied(), ignored.iter().copied(), patterns.iter().copied())
			.inner
			.clone()
	}

	#[test]
	fn ignored_by_name_relative_or_exact_path() {
		let w = inner(&["."], &["tmp", "web/node_modules", "/abs/cache"], &[]);
		assert!(w.is_ignored(Path::new("./tmp")));
		assert!(w.is_ignored(Path::new("./pkg/tmp")));
		assert!(w.is_ignored(Path::new("./web/node_modules")));
		assert!(w.is_ignored(Path::new("/abs/cache")));
		assert!(!w.is_ignored(Path::new("./src")));
		assert!(!w.is_ignored(Path::new("./node_modules")));
	}

	#[test]
	fn hidden_dirs_skipped_below_root() {
		let w = inner(&["."], &[], &[]);
		assert!(w.skip_dir(Path::new("./.git"), false));
		assert!(!w.skip_dir(Path::new("."), true));
		assert!(!w.skip_dir(Path::new("./.hidden-root"), true));
		assert!(!w.skip_dir(Path::new("./src"), false));
	}

	#[test]
	fn matches_glob_on_base_name_or_exact_path() {
		let w = inner(&["."], &[], &["*.go", "./config/app.yaml"]);
		let matchers = compile_patterns(&w.patterns).unwrap();
		assert!(w.file_matches(&matchers, Path::new("./cmd/main.go")));
		assert!(w.file_matches(&matchers, Path::new("./config/app.yaml")));
		assert!(!w.file_matches(&matchers, Path::new("./other/app.yaml")));
		assert!(!w.file_matches(&matchers, Path::new("./README.md")));
	}

	#[test]
	fn invalid_pattern_is_rejected() {
		let err = compile_patterns(&["a[".to_string()]).unwrap_err();
		assert!(matches!(err, WatchError::Pattern { .. }));
	}
}
