use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tokio::sync::mpsc;

use hotrun::config::{self, Config};
use hotrun::{control, logging, Runner, Watcher};
use hotrun_ctl::{client, ControlListener, Request, Response};
use hotrun_proc::Builder;

#[derive(Debug, Parser)]
#[command(name = "hotrun", version, about = "Rebuild and restart a program when its sources change")]
struct Cli {
	/// Config file (default: ./hotrun.toml if present)
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Send a command to a running hotrun
	Ctl {
		#[arg(value_enum)]
		action: CtlAction,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CtlAction {
	/// Switch to debug mode
	Debug,
	/// Switch back to live rebuild mode
	Rebuild,
	/// Shut hotrun down
	Stop,
}

impl CtlAction {
	fn request(self) -> Request {
		match self {
			CtlAction::Debug => Request::SetMode { mode: "DEBUG".into() },
			CtlAction::Rebuild => Request::SetMode { mode: "LIVEREBUILD".into() },
			CtlAction::Stop => Request::Stop,
		}
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let config = match config::load_config(cli.config.as_deref()) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	match cli.command {
		Some(Command::Ctl { action }) => cmd_ctl(&config, action),
		None => {
			let runtime = match tokio::runtime::Runtime::new() {
				Ok(runtime) => runtime,
				Err(e) => {
					eprintln!("{} cannot start runtime: {}", "error:".red().bold(), e);
					return ExitCode::FAILURE;
				}
			};
			runtime.block_on(run(config))
		}
	}
}

fn cmd_ctl(config: &Config, action: CtlAction) -> ExitCode {
	let addr = match config.ctl_address() {
		Ok(addr) => addr,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	let request = action.request();
	println!("{} {}", "Client sent:".dimmed(), request);

	match client::send(&addr, &request) {
		Ok(response @ Response::Ok(_)) => {
			println!("{} {}", "Response:".dimmed(), response.green());
			ExitCode::SUCCESS
		}
		Ok(response) => {
			println!("{} {}", "Response:".dimmed(), response.red());
			ExitCode::FAILURE
		}
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::FAILURE
		}
	}
}

async fn run(config: Config) -> ExitCode {
	let level = match config.log_level() {
		Ok(level) => level,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};
	logging::init(level);

	let addr = match config.ctl_address() {
		Ok(addr) => addr,
		Err(e) => {
			tracing::error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	if let Err(e) = std::fs::create_dir_all(&config.build.tmp_dir) {
		tracing::error!("cannot create {}: {}", config.build.tmp_dir.display(), e);
		return ExitCode::FAILURE;
	}

	let builder = Builder::new(config.build.command.clone(), config.build.error_log.clone());
	let watcher = Watcher::new(
		config.watch.directories.iter().cloned(),
		config.watch.ignored_directories.iter().cloned(),
		config.watch.watch_patterns.iter().cloned(),
	);
	let runner = Arc::new(Runner::new(config.runner_options(), builder, watcher));

	let listener = match ControlListener::bind(&addr).await {
		Ok(listener) => listener,
		Err(e) => {
			tracing::error!("cannot listen on {}: {}", addr, e);
			return ExitCode::FAILURE;
		}
	};

	let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
	let handler_runner = Arc::clone(&runner);
	let server = tokio::spawn(listener.serve(
		move |request: Request| {
			let runner = Arc::clone(&handler_runner);
			async move { control::handle_request(&runner, request).await }
		},
		shutdown_tx,
	));

	if let Err(e) = runner.start().await {
		tracing::error!("{}", e);
		server.abort();
		return ExitCode::FAILURE;
	}
	tracing::info!("hotrun started (pid {}), watching for changes", std::process::id());

	tokio::select! {
		_ = shutdown_rx.recv() => {}
		_ = tokio::signal::ctrl_c() => {}
		_ = terminate() => {}
	}
	tracing::info!("shutting down");

	let code = match runner.stop().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!("{}", e);
			ExitCode::FAILURE
		}
	};
	server.abort();
	let _ = server.await;
	code
}

#[cfg(unix)]
async fn terminate() {
	use tokio::signal::unix::{signal, SignalKind};

	match signal(SignalKind::terminate()) {
		Ok(mut sigterm) => {
			sigterm.recv().await;
		}
		Err(e) => {
			tracing::warn!("cannot listen for SIGTERM: {}", e);
			std::future::pending::<()>().await;
		}
	}
}

#[cfg(not(unix))]
async fn terminate() {
	std::future::pending::<()>().await;
}
