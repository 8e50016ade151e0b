pub mod config;
pub mod error;
mod helpers;
pub mod operator;
pub mod options;
pub mod outcome;
pub mod recorder;
pub mod run;
pub mod sequence;
pub mod session;
pub mod step;
pub mod test_executors;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use helpers::*;
