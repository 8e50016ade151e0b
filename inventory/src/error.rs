use std::{io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("test log lacks {0:?} column")]
	MissingColumn(&'static str),

	#[error("box {0} not found")]
	BoxNotFound(String),

	#[error("`{program}` failed with {status}: {stderr}")]
	Command {
		program: String,
		status: std::process::ExitStatus,
		stderr: String,
	},

	#[error("could not run {0}: {1}")]
	Spawn(PathBuf, io::Error),

	#[error("csv: {0}")]
	Csv(#[from] csv::Error),

	#[error("io: {0}")]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
