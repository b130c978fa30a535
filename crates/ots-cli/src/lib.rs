//! ots CLI Library
//!
//! Command-line surface over the deployment timeline: image aliases,
//! rollback, history, and the service instance registry. Container and
//! unit lifecycle live elsewhere; these commands only read and write the
//! store.

pub mod cli;
pub mod image_cmd;
pub mod service_cmd;

use std::process::ExitCode;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command did what was asked.
    Done,
    /// Nothing to act on: no rollback target, alias unset, unknown instance.
    NothingToDo,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Self::SUCCESS,
            // Distinct from the generic failure code (1) used for errors.
            Outcome::NothingToDo => Self::from(2),
        }
    }
}
