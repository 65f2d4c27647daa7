/// Install the global `tracing` subscriber. Later calls are ignored.
pub fn init(level: tracing::Level) {
	let _ = tracing_subscriber::fmt()
		.with_max_level(level)
		.with_target(false)
		.try_init();
}
