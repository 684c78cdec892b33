//! CiA-402 device state machine (host side).
//!
//! Classifies the drive's statusword and answers with the controlword that
//! moves it one step toward `OperationEnabled`. The rule table is evaluated
//! in order and the first match wins; anything unmatched is `Unclassified`.
//!
//! | mask   | pattern | state                 | control |
//! |--------|---------|-----------------------|---------|
//! | 0x4F   | 0x00    | NotReadyToSwitchOn    | 0x80    |
//! | 0x4F   | 0x40    | SwitchOnDisabled      | 0x06    |
//! | 0x6F   | 0x21    | ReadyToSwitchOn       | 0x07    |
//! | 0x6F   | 0x23    | SwitchedOn            | 0x0F    |
//! | 0x6F   | 0x27    | OperationEnabled      | 0x1F    |
//! | 0x6F   | 0x07    | QuickStopActive       | 0x00    |
//! | 0x4F   | 0x0F    | FaultReactionActive   | 0x80    |
//! | 0x4F   | 0x08    | Fault                 | 0x80    |
//!
//! Fault states are always answered with a fault reset; the host never
//! escalates or retries differently.

use ecat_common::cia402::{ControlWord, DriveState};
use tracing::{debug, warn};

/// Statusword classification rule.
#[derive(Debug, Clone, Copy)]
struct Rule {
    mask: u16,
    pattern: u16,
    state: DriveState,
    control: ControlWord,
}

const fn rule(mask: u16, pattern: u16, state: DriveState, control: ControlWord) -> Rule {
    Rule {
        mask,
        pattern,
        state,
        control,
    }
}

const RULES: [Rule; 8] = [
    rule(0x4F, 0x00, DriveState::NotReadyToSwitchOn, ControlWord::RESET),
    rule(0x4F, 0x40, DriveState::SwitchOnDisabled, ControlWord::SHUTDOWN),
    rule(0x6F, 0x21, DriveState::ReadyToSwitchOn, ControlWord::SWITCH_ON_CMD),
    rule(0x6F, 0x23, DriveState::SwitchedOn, ControlWord::ENABLE_OPERATION_CMD),
    rule(0x6F, 0x27, DriveState::OperationEnabled, ControlWord::OPERATE),
    rule(0x6F, 0x07, DriveState::QuickStopActive, ControlWord::DISABLE_VOLTAGE),
    rule(0x4F, 0x0F, DriveState::FaultReactionActive, ControlWord::RESET),
    rule(0x4F, 0x08, DriveState::Fault, ControlWord::RESET),
];

/// Result of one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommand {
    /// Drive state the statusword was classified as.
    pub state: DriveState,
    /// Controlword to write this cycle.
    pub control: u16,
}

/// Classify `status` and compute the answering controlword.
///
/// Pure and total: every 16-bit input maps to exactly one output.
#[inline]
pub const fn next(status: u16) -> DeviceCommand {
    let mut i = 0;
    while i < RULES.len() {
        let r = RULES[i];
        if status & r.mask == r.pattern {
            return DeviceCommand {
                state: r.state,
                control: r.control.bits(),
            };
        }
        i += 1;
    }
    DeviceCommand {
        state: DriveState::Unclassified,
        control: ControlWord::RESET.bits(),
    }
}

/// Stateful wrapper around [`next`] that tracks transitions.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateMachine {
    state: DriveState,
    transitions: u64,
}

impl DeviceStateMachine {
    /// Start from `NotReadyToSwitchOn`.
    pub fn new() -> Self {
        Self::default()
    }

    /// State observed on the last update.
    #[inline]
    pub const fn state(&self) -> DriveState {
        self.state
    }

    /// Number of state changes observed.
    #[inline]
    pub const fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Classify a fresh statusword.
    #[inline]
    pub fn update(&mut self, status: u16) -> DeviceCommand {
        let command = next(status);
        if command.state != self.state {
            self.transitions += 1;
            if command.state.is_fault() {
                warn!(
                    "Drive {:?} → {:?} (status=0x{status:04X})",
                    self.state, command.state
                );
            } else {
                debug!(
                    "Drive {:?} → {:?} (status=0x{status:04X}, control=0x{:04X})",
                    self.state, command.state, command.control
                );
            }
            self.state = command.state;
        }
        command
    }
}
