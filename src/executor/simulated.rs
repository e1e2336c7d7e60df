//! Simulated output device.
//!
//! Stands in for real hardware: it validates commands the same way the
//! device drivers do and keeps the resulting state in memory, so the bridge
//! can be run and tested without a card attached.

use std::str::FromStr;

use super::Executor;
use crate::command::{BufferedProgram, Command, ManualValues};
use crate::error::{BridgeError, Result};
use crate::protocol::SampleType;

/// Supported device profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// 8 analog outputs (`ao0`..`ao7`) and 8 digital lines (`do_0`..`do_7`).
    Analog6713,
    /// 32 digital lines on four ports (`port0/line0`..`port3/line7`).
    Digital32,
}

impl DeviceKind {
    /// Channel names a manual program must set.
    pub fn manual_channels(self) -> Vec<String> {
        match self {
            DeviceKind::Analog6713 => (0..8)
                .map(|i| format!("ao{}", i))
                .chain((0..8).map(|i| format!("do_{}", i)))
                .collect(),
            DeviceKind::Digital32 => (0..4)
                .flat_map(|port| (0..8).map(move |line| format!("port{}/line{}", port, line)))
                .collect(),
        }
    }

    /// Sample type the device accepts for buffered runs.
    pub fn sample_type(self) -> SampleType {
        match self {
            DeviceKind::Analog6713 => SampleType::Float32,
            DeviceKind::Digital32 => SampleType::UInt8,
        }
    }
}

impl FromStr for DeviceKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "6713" => Ok(DeviceKind::Analog6713),
            "dio" | "dio32" => Ok(DeviceKind::Digital32),
            other => Err(BridgeError::Config(format!(
                "unsupported device type '{}'",
                other
            ))),
        }
    }
}

/// The buffer last programmed into the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammedBuffer {
    /// Sample clock terminal.
    pub clock_terminal: String,
    /// Output channels.
    pub channels: Vec<String>,
    /// Samples per channel.
    pub samples: usize,
}

/// In-memory device that enforces the driver rules.
#[derive(Debug)]
pub struct SimulatedDevice {
    name: String,
    kind: DeviceKind,
    outputs: ManualValues,
    buffer: Option<ProgrammedBuffer>,
    wait_for_rerun: bool,
    runs: usize,
    history: Vec<Command>,
    shut_down: bool,
}

impl SimulatedDevice {
    /// Create a device with all static outputs at zero.
    pub fn new(name: impl Into<String>, kind: DeviceKind) -> Self {
        let outputs = kind
            .manual_channels()
            .into_iter()
            .map(|ch| (ch, 0.0))
            .collect();
        Self {
            name: name.into(),
            kind,
            outputs,
            buffer: None,
            wait_for_rerun: false,
            runs: 0,
            history: Vec::new(),
            shut_down: false,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device profile.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Current static output values.
    pub fn outputs(&self) -> &ManualValues {
        &self.outputs
    }

    /// Last programmed buffer, if any.
    pub fn buffer(&self) -> Option<&ProgrammedBuffer> {
        self.buffer.as_ref()
    }

    /// Whether the device keeps its buffer for a rerun.
    pub fn is_waiting_for_rerun(&self) -> bool {
        self.wait_for_rerun
    }

    /// Number of buffered runs started (fresh or replayed).
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Every command received, in execution order.
    pub fn history(&self) -> &[Command] {
        &self.history
    }

    /// Whether `shutdown` was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn program_manual(&mut self, values: &ManualValues) -> Result<()> {
        if self.wait_for_rerun {
            tracing::info!(device = %self.name, "no longer waiting for rerun, back to static");
            self.wait_for_rerun = false;
            self.buffer = None;
        }
        let mut next = self.outputs.clone();
        for channel in self.kind.manual_channels() {
            let value = values.get(&channel).ok_or_else(|| {
                BridgeError::Executor(format!("manual program is missing channel '{}'", channel))
            })?;
            next.insert(channel, *value);
        }
        self.outputs = next;
        Ok(())
    }

    fn transition_to_buffered(&mut self, program: &BufferedProgram) -> Result<()> {
        match program {
            BufferedProgram::Replay => {
                if !self.wait_for_rerun || self.buffer.is_none() {
                    return Err(BridgeError::Executor("cannot rerun task".to_string()));
                }
                self.runs += 1;
                Ok(())
            }
            BufferedProgram::Fresh {
                clock_terminal,
                channels,
                data,
            } => {
                if clock_terminal.is_empty() || channels.is_empty() || data.shape().is_empty() {
                    return Err(BridgeError::Executor(
                        "cannot program device, some arguments are missing".to_string(),
                    ));
                }
                if data.sample_type() != self.kind.sample_type() {
                    return Err(BridgeError::Executor(format!(
                        "{:?} device cannot output {:?} samples",
                        self.kind,
                        data.sample_type()
                    )));
                }
                self.buffer = Some(ProgrammedBuffer {
                    clock_terminal: clock_terminal.clone(),
                    channels: channels.clone(),
                    samples: data.samples(),
                });
                self.runs += 1;
                Ok(())
            }
        }
    }

    fn transition_to_manual(&mut self, abort: bool) {
        if abort {
            self.wait_for_rerun = false;
            self.buffer = None;
        } else {
            self.wait_for_rerun = true;
        }
    }
}

impl Executor for SimulatedDevice {
    fn execute(&mut self, command: Command) -> Result<()> {
        let outcome = match &command {
            Command::Manual(values) => self.program_manual(values),
            Command::TransitionToBuffered(program) => self.transition_to_buffered(program),
            Command::TransitionToManual { abort, .. } => {
                self.transition_to_manual(*abort);
                Ok(())
            }
        };
        self.history.push(command);
        outcome
    }

    fn shutdown(&mut self) {
        tracing::info!(device = %self.name, "shutdown device");
        self.shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SampleArray;
    use ndarray::array;

    fn analog_program() -> BufferedProgram {
        BufferedProgram::Fresh {
            clock_terminal: "/Dev1/PFI0".to_string(),
            channels: vec!["Dev1/ao0:2".to_string()],
            data: SampleArray::Float32(array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]),
        }
    }

    fn full_manual(kind: DeviceKind, value: f64) -> ManualValues {
        kind.manual_channels()
            .into_iter()
            .map(|c| (c, value))
            .collect()
    }

    #[test]
    fn test_device_kind_parsing() {
        assert_eq!("6713".parse::<DeviceKind>().unwrap(), DeviceKind::Analog6713);
        assert_eq!("DIO".parse::<DeviceKind>().unwrap(), DeviceKind::Digital32);
        assert!("6259".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_channel_names() {
        let analog = DeviceKind::Analog6713.manual_channels();
        assert_eq!(analog.len(), 16);
        assert_eq!(analog[0], "ao0");
        assert_eq!(analog[15], "do_7");

        let digital = DeviceKind::Digital32.manual_channels();
        assert_eq!(digital.len(), 32);
        assert_eq!(digital[9], "port1/line1");
    }

    #[test]
    fn test_manual_requires_all_channels() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Analog6713);
        let mut values = ManualValues::new();
        values.insert("ao0".into(), 1.0);
        assert!(dev.execute(Command::Manual(values)).is_err());

        dev.execute(Command::Manual(full_manual(DeviceKind::Analog6713, 2.5)))
            .unwrap();
        assert_eq!(dev.outputs()["ao3"], 2.5);
        assert_eq!(dev.history().len(), 2);
    }

    #[test]
    fn test_fresh_then_rerun_cycle() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Analog6713);

        dev.execute(Command::TransitionToBuffered(analog_program()))
            .unwrap();
        assert_eq!(dev.buffer().unwrap().samples, 2);

        // replay only after a non-abort transition to manual
        assert!(dev
            .execute(Command::TransitionToBuffered(BufferedProgram::Replay))
            .is_err());
        dev.execute(Command::TransitionToManual {
            more_reps: true,
            abort: false,
        })
        .unwrap();
        assert!(dev.is_waiting_for_rerun());
        dev.execute(Command::TransitionToBuffered(BufferedProgram::Replay))
            .unwrap();
        assert_eq!(dev.runs(), 2);
    }

    #[test]
    fn test_manual_cancels_rerun() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Digital32);
        dev.execute(Command::TransitionToBuffered(BufferedProgram::Fresh {
            clock_terminal: "/Dev1/PFI2".into(),
            channels: vec!["Dev1/port0/line0:7".into()],
            data: SampleArray::UInt8(array![[1u8], [0]]),
        }))
        .unwrap();
        dev.execute(Command::TransitionToManual {
            more_reps: true,
            abort: false,
        })
        .unwrap();
        dev.execute(Command::Manual(full_manual(DeviceKind::Digital32, 1.0)))
            .unwrap();

        assert!(!dev.is_waiting_for_rerun());
        assert!(dev
            .execute(Command::TransitionToBuffered(BufferedProgram::Replay))
            .is_err());
    }

    #[test]
    fn test_abort_clears_buffer() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Analog6713);
        dev.execute(Command::TransitionToBuffered(analog_program()))
            .unwrap();
        dev.execute(Command::TransitionToManual {
            more_reps: false,
            abort: true,
        })
        .unwrap();
        assert!(dev.buffer().is_none());
        assert!(!dev.is_waiting_for_rerun());
    }

    #[test]
    fn test_sample_type_must_match() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Digital32);
        let result = dev.execute(Command::TransitionToBuffered(analog_program()));
        assert!(matches!(result, Err(BridgeError::Executor(_))));
    }

    #[test]
    fn test_missing_arguments() {
        let mut dev = SimulatedDevice::new("Dev1", DeviceKind::Analog6713);
        let result = dev.execute(Command::TransitionToBuffered(BufferedProgram::Fresh {
            clock_terminal: String::new(),
            channels: vec!["Dev1/ao0".into()],
            data: SampleArray::Float32(array![[0.0f32]]),
        }));
        assert!(result.is_err());
    }
}
