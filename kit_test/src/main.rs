use std::{
	path::{Path, PathBuf},
	process::ExitCode,
};

use clap::Parser;
use kit_test::{
	avrdude,
	config::{AbortSignal, TestConfig},
	detector::CommandDetector,
	error::Error,
	logger,
	operator::{ConsoleOperator, Operator},
	options::{Command, EmptyBoxesArgs, InventoryArgs, Options},
	recorder::{self, Column, Recorder},
	run::TestRun,
	session::DeviceRegistry,
	test_executors::{
		self,
		arduino::{self, ArduinoTestExecutor},
		camera::CameraTestExecutor,
		motor::MotorTestExecutor,
		power::PowerTestExecutor,
		servo::ServoTestExecutor,
		TestExecutor,
	},
};

fn report(run: &TestRun) {
	let noun = run.board_type().noun();

	match run.first_failure() {
		None if run.passed() => {
			logger::success(&format!("The {} passed", noun));
			logger::banner("PASS", colored::Color::Green);
		}
		failure => {
			logger::error(&format!("The {} failed", noun));
			if let Some(record) = failure {
				logger::error(&format!(
					"{}: {}",
					record.step,
					record.outcome.reason().unwrap_or_default()
				));
			}
			logger::banner("FAIL", colored::Color::Red);
		}
	}
}

/// Ask to carry on; an interrupted prompt counts as no.
fn ready(operator: &mut dyn Operator, question: &str) -> Result<bool, Error> {
	match operator.confirm(question) {
		Ok(answer) => Ok(answer),
		Err(Error::UserAbort) => Ok(false),
		Err(e) => Err(e),
	}
}

/// Test boards until the operator is done. Returns whether every board
/// passed.
fn test_boards<E: TestExecutor>(mut executor: E, log: Option<PathBuf>, config: &TestConfig) -> Result<bool, Error> {
	let path = match log {
		Some(path) => path,
		None => recorder::temporary_log()?,
	};
	let mut recorder = Recorder::resume(&path, &Column::EXTENDED)?;

	let abort = AbortSignal::new();
	let handler = abort.clone();
	ctrlc::set_handler(move || handler.trigger())
		.map_err(|e| Error::check(format!("could not install Ctrl-C handler: {}", e)))?;

	let registry = DeviceRegistry::new();
	let mut operator = ConsoleOperator;
	let noun = executor.board_type().noun();
	let mut all_passed = true;

	operator.instruct(&format!("Please connect the {}", noun));
	if !ready(&mut operator, &format!("Is the {} connected?", noun))? {
		return Ok(true);
	}

	loop {
		abort.clear();

		let run = test_executors::run_once(&mut executor, &registry, config, &mut operator, &abort);
		report(&run);
		all_passed &= run.passed();

		recorder.record(run);
		recorder.export(&path)?;

		operator.instruct(&format!("Swap in the next {} to continue", noun));
		if !ready(&mut operator, &format!("Test another {}?", noun))? {
			break;
		}
	}

	logger::in_progress(&format!("Results written to {}", path.display()));

	Ok(all_passed)
}

fn flash_arduinos(avrdude_path: &Path, hex: &Path) -> Result<bool, Error> {
	if !hex.is_file() {
		return Err(Error::Flash(format!("{} not found", hex.display())));
	}

	let mut operator = ConsoleOperator;
	let mut all_flashed = true;

	operator.instruct("Please connect the arduino");
	if !ready(&mut operator, "Is the arduino connected?")? {
		return Ok(true);
	}

	loop {
		logger::in_progress(&format!("Flashing {}...", hex.display()));

		match arduino::flash_first(avrdude_path, hex) {
			Ok(()) => {
				logger::success("Flashed");
				logger::banner("DONE", colored::Color::Green);
			}
			Err(e) => {
				all_flashed = false;
				logger::error(&e.to_string());
				logger::banner("FAIL", colored::Color::Red);
			}
		}

		if !ready(&mut operator, "Flash another arduino?")? {
			break;
		}
	}

	Ok(all_flashed)
}

fn update_inventory(args: &InventoryArgs) -> Result<bool, Error> {
	let mut checkout = kit_inventory::Checkout::new(&args.inventory, &args.git);
	let plan = kit_inventory::plan(&args.test_data, &mut checkout, &args.update_options())?;

	if plan.updates.is_empty() {
		logger::skipped("No assets to update");
		return Ok(true);
	}

	for update in &plan.updates {
		logger::in_progress(&format!(
			"{} ({}): condition {}, tested on {}",
			update.item.code,
			update.item.name,
			update.condition(),
			plan.tested_on
		));
	}
	if let Some(target) = &plan.target {
		for item in plan.moves() {
			logger::in_progress(&format!("{}: move into {}", item.code, target.code));
		}
	}

	let part_types = plan.part_types();
	if part_types.len() > 1 {
		logger::error(&format!(
			"Updating more than one type of part: {}",
			part_types.into_iter().collect::<Vec<_>>().join(", ")
		));

		if !ready(&mut ConsoleOperator, "Continue anyway?")? {
			return Ok(true);
		}
	}

	if args.dry_run {
		logger::skipped("Dry run, nothing changed");
		return Ok(true);
	}

	kit_inventory::apply(&plan, &mut checkout)?;
	logger::success(&format!("Updated {} assets", plan.updates.len()));

	Ok(true)
}

fn empty_boxes(args: &EmptyBoxesArgs) -> Result<bool, Error> {
	let mut checkout = kit_inventory::Checkout::new(&args.inventory, &args.git);
	let emptying = kit_inventory::plan_emptying(&mut checkout, &args.boxes)?;

	for (assembly, contents) in &emptying.boxes {
		for item in contents {
			logger::in_progress(&format!(
				"{} ({}): move from {} to {}",
				item.code,
				item.name,
				assembly.code,
				args.loose.display()
			));
		}
	}

	if emptying.items().is_empty() {
		logger::skipped("Boxes are already empty");
		return Ok(true);
	}

	if args.dry_run {
		logger::skipped("Dry run, nothing changed");
		return Ok(true);
	}

	kit_inventory::empty_boxes(&emptying, &mut checkout, &args.loose)?;
	logger::success(&format!("Moved {} items", emptying.items().len()));

	Ok(true)
}

fn run(command: Command) -> Result<bool, Error> {
	let config = command.test_config();
	let log = command.log().cloned();

	match command {
		Command::PowerV4 { .. } => test_boards(PowerTestExecutor, log, &config),
		Command::MotorV4 { .. } => test_boards(MotorTestExecutor, log, &config),
		Command::ServoV4 { .. } => test_boards(ServoTestExecutor, log, &config),
		Command::Arduino {
			test_hex,
			stock_fw_hex,
			avrdude,
			..
		} => {
			let avrdude = avrdude::find(avrdude.avrdude.as_deref())?;
			arduino::check_files(&test_hex, &stock_fw_hex)?;

			let executor = ArduinoTestExecutor {
				avrdude,
				test_hex,
				stock_hex: stock_fw_hex,
			};

			test_boards(executor, log, &config)
		}
		Command::FlashArduino { fw_hex, avrdude } => {
			let avrdude = avrdude::find(avrdude.avrdude.as_deref())?;

			flash_arduinos(&avrdude, &fw_hex)
		}
		Command::Camera {
			vidpid_filter,
			marker_id,
			marker_size,
			detector,
			..
		} => {
			CommandDetector::new(&detector)?;

			let executor = CameraTestExecutor {
				vidpid_filter,
				marker_id,
				marker_size_mm: marker_size,
				detector,
			};

			test_boards(executor, log, &config)
		}
		Command::UpdateInventory(args) => update_inventory(&args),
		Command::EmptyBoxes(args) => empty_boxes(&args),
	}
}

fn main() -> ExitCode {
	let options = Options::parse();

	logger::init_tracing(options.debug);

	match run(options.command) {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::from(1),
		Err(e) => {
			logger::error(&e.to_string());

			ExitCode::from(2)
		}
	}
}
