use std::{cell::Cell, rc::Rc, time::Duration};

use kit_test::{
	config::{AbortSignal, Flag, TestConfig},
	error::Error,
	operator::ScriptedOperator,
	outcome::{Measurements, Outcome},
	recorder::{Column, Recorder},
	run::BoardType,
	sequence::TestSequence,
	session::{DeviceHandle, DeviceRegistry},
	step::{measured, TestStep},
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Bench {
	output_on: bool,
}

impl DeviceHandle for Bench {}

fn run(sequence: &TestSequence<Bench>, config: &TestConfig) -> kit_test::run::TestRun {
	sequence.execute(
		&mut Bench::default(),
		config,
		&mut ScriptedOperator::default(),
		&AbortSignal::new(),
	)
}

fn output_sequence() -> TestSequence<Bench> {
	TestSequence::new(BoardType::PowerV4, vec![
		TestStep::required("EnableOutput", |bench: &mut Bench, _| {
			bench.output_on = true;
			Ok(Measurements::new())
		}),
		TestStep::required("MeasureCurrent", |_: &mut Bench, _| Err(Error::check("out of range"))),
		TestStep::required("Buzzer", |_: &mut Bench, _| Ok(Measurements::new())),
	])
}

#[test]
fn a_failure_skips_the_rest() {
	let run = run(&output_sequence(), &TestConfig::default());

	assert_eq!(run.outcomes().cloned().collect::<Vec<_>>(), vec![
		Outcome::pass(Measurements::new()),
		Outcome::fail("out of range"),
		Outcome::skipped("aborted"),
	]);
	assert!(!run.passed());
	assert_eq!(run.first_failure().map(|r| r.step.as_str()), Some("MeasureCurrent"));
}

#[test]
fn cleanup_runs_after_a_failure() {
	let cleaned = Rc::new(Cell::new(false));
	let flag = Rc::clone(&cleaned);

	let sequence = TestSequence::new(BoardType::MotorV4, vec![
		TestStep::required("Identify", |_: &mut Bench, _| Err(Error::connection("no reply"))),
		TestStep::required("Reset", |_: &mut Bench, _| Ok(Measurements::new())),
		TestStep::cleanup("Reset board", move |_: &mut Bench, _| {
			flag.set(true);
			Ok(Measurements::new())
		}),
	]);

	let run = run(&sequence, &TestConfig::default());

	assert!(cleaned.get());
	assert_eq!(
		run.outcomes().map(Outcome::label).collect::<Vec<_>>(),
		vec!["fail", "skipped", "pass"]
	);
}

#[test]
fn uvlo_is_skipped_without_the_flag() {
	let sequence = TestSequence::new(BoardType::PowerV4, vec![
		TestStep::required("Identify", |_: &mut Bench, _| Ok(Measurements::new())),
		TestStep::optional("UVLO", Flag::TestUvlo, |_: &mut Bench, _| Ok(measured("soft_uvlo", 10.8))),
	]);

	let skipped = run(&sequence, &TestConfig::default());
	assert!(skipped.records()[1].outcome.is_skipped());
	assert!(skipped.passed());

	let tested = run(&sequence, &TestConfig::default().with(Flag::TestUvlo));
	assert_eq!(tested.records()[1].outcome, Outcome::pass(measured("soft_uvlo", 10.8)));
}

#[test]
fn slow_steps_time_out() {
	let sequence = TestSequence::new(BoardType::ServoV4, vec![TestStep::required(
		"Regulator voltage",
		|_: &mut Bench, ctx| {
			ctx.deadline.sleep(Duration::from_millis(50))?;
			Ok(Measurements::new())
		},
	)
	.with_timeout(Duration::from_millis(10))]);

	let run = run(&sequence, &TestConfig::default());

	assert_eq!(run.records()[0].outcome, Outcome::fail("timeout"));
}

#[test]
fn a_held_device_cannot_be_acquired_twice() {
	let registry = DeviceRegistry::new();

	let session = registry
		.acquire("/dev/ttyACM0", Duration::from_millis(10), |_| Ok(Bench::default()))
		.unwrap();
	let second = registry.acquire("/dev/ttyACM0", Duration::from_millis(10), |_| Ok(Bench::default()));

	match second {
		Err(Error::Connection(reason)) => assert_eq!(reason, "already in use"),
		Err(e) => panic!("unexpected error {}", e),
		Ok(_) => panic!("acquired a held device"),
	}

	drop(session);
	assert!(!registry.is_held("/dev/ttyACM0"));
}

#[test]
fn exporting_twice_writes_the_same_log() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("results.csv");
	let mut recorder = Recorder::new(&Column::EXTENDED);
	recorder.record(run(&output_sequence(), &TestConfig::default()));

	recorder.export(&path).unwrap();
	let first = std::fs::read_to_string(&path).unwrap();
	recorder.export(&path).unwrap();

	assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
	assert_eq!(first.lines().count(), 4);
	assert!(first.starts_with("run_id,board_type,station,asset,serial,firmware,step_name"));
}
