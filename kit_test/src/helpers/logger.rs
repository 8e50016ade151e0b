use colored::Colorize;

pub fn write(msg: &str, color: colored::Color) {
	println!("{}", msg.color(color));
}

pub fn error(msg: &str) {
	write(&format!("╳ {}", msg), colored::Color::Red);
}

pub fn success(msg: &str) {
	write(&format!("✓ {}", msg), colored::Color::Green);
}

pub fn in_progress(msg: &str) {
	write(&format!("… {}", msg), colored::Color::White);
}

pub fn skipped(msg: &str) {
	write(&format!("- {}", msg), colored::Color::BrightBlack);
}

pub fn action(msg: &str) {
	write(&format!("[ {} ]", msg), colored::Color::BrightBlue);
}

/// A full-width block of colour with `msg` in the middle.
pub fn banner(msg: &str, color: colored::Color) {
	let columns = crossterm::terminal::size()
		.map(|(columns, _)| columns as usize)
		.unwrap_or(40);

	let fill = "X".repeat(columns);

	for _ in 0..2 {
		println!("{}", fill.on_color(color).color(color));
	}
	println!("{}", format!("{: ^columns$}", msg).on_color(color).black().bold());
	for _ in 0..2 {
		println!("{}", fill.on_color(color).color(color));
	}
}

/// Install the diagnostic subscriber; `RUST_LOG` wins over `--debug`.
pub fn init_tracing(debug: bool) {
	let default = if debug { "debug" } else { "info" };
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.try_init();
}
