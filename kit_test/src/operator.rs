use std::collections::VecDeque;

use crate::{error::Error, logger};

/// The person at the test bench.
pub trait Operator {
	/// Ask a yes/no question, defaulting to yes.
	fn confirm(&mut self, question: &str) -> Result<bool, Error>;

	fn input(&mut self, prompt: &str) -> Result<String, Error>;

	/// Show an instruction that needs no answer.
	fn instruct(&mut self, msg: &str) {
		logger::action(msg);
	}
}

pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
	fn confirm(&mut self, question: &str) -> Result<bool, Error> {
		dialoguer::Confirm::new()
			.with_prompt(question)
			.default(true)
			.interact()
			.map_err(|e| {
				tracing::debug!("prompt interrupted: {}", e);
				Error::UserAbort
			})
	}

	fn input(&mut self, prompt: &str) -> Result<String, Error> {
		dialoguer::Input::<String>::new()
			.with_prompt(prompt)
			.interact_text()
			.map(|s| s.trim().to_string())
			.map_err(|e| {
				tracing::debug!("prompt interrupted: {}", e);
				Error::UserAbort
			})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
	Yes,
	No,
	Text(String),
	Abort,
}

/// Replays canned answers; runs out into `UserAbort`.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
	answers: VecDeque<Answer>,
	pub asked: Vec<String>,
}

impl ScriptedOperator {
	pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
		Self {
			answers: answers.into_iter().collect(),
			asked: Vec::new(),
		}
	}

	fn next(&mut self, question: &str) -> Option<Answer> {
		self.asked.push(question.to_string());
		self.answers.pop_front()
	}
}

impl Operator for ScriptedOperator {
	fn confirm(&mut self, question: &str) -> Result<bool, Error> {
		match self.next(question) {
			Some(Answer::Yes) => Ok(true),
			Some(Answer::No) => Ok(false),
			Some(Answer::Text(s)) => Ok(s.is_empty() || s.eq_ignore_ascii_case("y")),
			Some(Answer::Abort) | None => Err(Error::UserAbort),
		}
	}

	fn input(&mut self, prompt: &str) -> Result<String, Error> {
		match self.next(prompt) {
			Some(Answer::Text(s)) => Ok(s),
			Some(Answer::Yes) => Ok("y".to_string()),
			Some(Answer::No) => Ok("n".to_string()),
			Some(Answer::Abort) | None => Err(Error::UserAbort),
		}
	}

	fn instruct(&mut self, msg: &str) {
		self.asked.push(msg.to_string());
	}
}
