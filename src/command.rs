//! Commands handed to the executor.
//!
//! A command is only ever built from a fully decoded frame (including any
//! bulk array), so the executor never sees a partially applied message.

use std::collections::BTreeMap;

use crate::protocol::SampleArray;

/// Channel name to output value for a manual (static) program.
pub type ManualValues = BTreeMap<String, f64>;

/// What a buffered transition asks the device to run.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferedProgram {
    /// `fresh = false`: rerun the last programmed buffer.
    Replay,
    /// `fresh = true`: program a new buffer.
    Fresh {
        /// Terminal providing the sample clock.
        clock_terminal: String,
        /// Physical channels the columns of `data` map onto.
        channels: Vec<String>,
        /// Samples, one row per clock tick.
        data: SampleArray,
    },
}

impl BufferedProgram {
    /// Whether new programming is required.
    pub fn is_fresh(&self) -> bool {
        matches!(self, BufferedProgram::Fresh { .. })
    }
}

/// A decoded command for the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Program static output values. No acknowledgment.
    Manual(ManualValues),
    /// Arm a buffered (hardware-timed) run.
    TransitionToBuffered(BufferedProgram),
    /// Leave buffered mode.
    TransitionToManual {
        /// The controller intends to rerun the same buffer.
        more_reps: bool,
        /// The run was aborted.
        abort: bool,
    },
}

impl Command {
    /// Whether the controller waits for a "task done" reply.
    pub fn requires_ack(&self) -> bool {
        !matches!(self, Command::Manual(_))
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Manual(_) => "manual",
            Command::TransitionToBuffered(_) => "transition_to_buffered",
            Command::TransitionToManual { .. } => "transition_to_manual",
        }
    }
}
