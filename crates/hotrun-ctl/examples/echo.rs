use hotrun_ctl::{client, ControlAddr, ControlListener, Reply, Request, Response};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
	let args: Vec<String> = std::env::args().collect();
	let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");
	let addr: ControlAddr = match args.get(2).map(|s| s.parse()).unwrap_or(Ok(ControlAddr::default())) {
		Ok(addr) => addr,
		Err(e) => {
			eprintln!("error: {e}");
			std::process::exit(1);
		}
	};

	match cmd {
		"run" => {
			let listener = match ControlListener::bind(&addr).await {
				Ok(listener) => listener,
				Err(e) => {
					eprintln!("error: {e}");
					std::process::exit(1);
				}
			};
			let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
			let server = tokio::spawn(listener.serve(
				|req: Request| async move {
					match req {
						Request::SetMode { mode } => Reply::from(Response::ok(format!("echo {mode}"))),
						Request::Stop => Reply::shutdown(),
					}
				},
				shutdown_tx,
			));
			eprintln!("listening on {addr}");
			shutdown_rx.recv().await;
			eprintln!("stop requested, exiting...");
			server.abort();
		}
		"debug" | "rebuild" | "stop" => {
			let request = match cmd {
				"debug" => Request::SetMode { mode: "DEBUG".into() },
				"rebuild" => Request::SetMode { mode: "LIVEREBUILD".into() },
				_ => Request::Stop,
			};
			match tokio::task::spawn_blocking(move || client::send(&addr, &request)).await {
				Ok(Ok(resp)) => println!("{resp}"),
				Ok(Err(e)) => eprintln!("error: {e}"),
				Err(e) => eprintln!("error: {e}"),
			}
		}
		_ => {
			eprintln!("usage: echo <run|debug|rebuild|stop> [address]");
		}
	}
}
