use hotrun_ctl::{Reply, Request, Response};

use crate::runner::{Mode, Runner, RunnerError};

/// Answer one control request against `runner`.
pub async fn handle_request(runner: &Runner, request: Request) -> Reply {
	match request {
		Request::SetMode { mode } => set_mode(runner, &mode).await.into(),
		Request::Stop => {
			tracing::info!("stop requested");
			Reply::shutdown()
		}
	}
}

async fn set_mode(runner: &Runner, mode: &str) -> Response {
	let mode: Mode = match mode.parse() {
		Ok(mode) => mode,
		Err(e) => return Response::err(e.to_string()),
	};

	match runner.set_mode(mode).await {
		Ok(()) => Response::ok(format!("Switched mode to {}", mode)),
		Err(RunnerError::Build(_)) => Response::err("Build error"),
		Err(e) => {
			tracing::error!("cannot switch to {} mode: {}", mode, e);
			Response::err(e.to_string())
		}
	}
}
