//! Emulated CiA-402 servo drive.
//!
//! The `SimulatedDrive` answers controlwords with the standard power state
//! transitions and follows cyclic-synchronous set-points:
//! - CSP: actual position tracks the target position exactly
//! - CSV: actual position integrates the target velocity
//!
//! Faults can be injected; the drive passes through `FaultReactionActive`
//! into `Fault` and clears on a fault reset once the fault condition is gone.

use ecat_common::cia402::{ControlWord, DriveState, ModeOfOperation, StatusWord};
use std::time::Duration;
use tracing::{debug, trace};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Cycles the drive spends in `NotReadyToSwitchOn` after power-up.
pub const BOOT_CYCLES: u32 = 2;

/// Controlword commands (masked per the CiA-402 command table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Shutdown,
    SwitchOn,
    EnableOperation,
    DisableVoltage,
    QuickStop,
    FaultReset,
    None,
}

fn decode(control: u16, previous: u16) -> Command {
    let cw = ControlWord::from_bits_truncate(control);
    let was = ControlWord::from_bits_truncate(previous);
    if cw.contains(ControlWord::FAULT_RESET) {
        // Level while faulted, edge otherwise.
        return if was.contains(ControlWord::FAULT_RESET) {
            Command::None
        } else {
            Command::FaultReset
        };
    }
    match control & 0x0F {
        0x0F => Command::EnableOperation,
        0x07 => Command::SwitchOn,
        0x06 | 0x0E => Command::Shutdown,
        0x02 | 0x03 | 0x0A | 0x0B => Command::QuickStop,
        c if c & 0x02 == 0 => Command::DisableVoltage,
        _ => Command::None,
    }
}

/// Set-points received from the host in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveOutputs {
    /// Controlword (0x6040).
    pub control_word: u16,
    /// Modes of operation (0x6060).
    pub mode: u8,
    /// Target position (0x607A).
    pub target_position: i32,
    /// Target velocity (0x60FF).
    pub target_velocity: i32,
}

/// Emulated servo drive state.
#[derive(Debug, Clone)]
pub struct SimulatedDrive {
    state: DriveState,
    /// Mode configured over SDO before activation.
    configured_mode: Option<ModeOfOperation>,
    /// Mode currently active (last valid 0x6060 value).
    active_mode: Option<ModeOfOperation>,
    position: i32,
    /// Sub-count remainder carried between CSV integration steps [counts·ns].
    position_remainder: i128,
    boot_cycles: u32,
    /// Remaining cycles the injected fault condition persists.
    fault_condition_cycles: u32,
    last_control: u16,
}

impl SimulatedDrive {
    /// Create a powered-up drive in `NotReadyToSwitchOn`.
    pub fn new() -> Self {
        Self {
            state: DriveState::NotReadyToSwitchOn,
            configured_mode: None,
            active_mode: None,
            position: 0,
            position_remainder: 0,
            boot_cycles: BOOT_CYCLES,
            fault_condition_cycles: 0,
            last_control: 0,
        }
    }

    /// Current power state.
    pub const fn state(&self) -> DriveState {
        self.state
    }

    /// Actual position [counts].
    pub const fn position(&self) -> i32 {
        self.position
    }

    /// Override the actual position (encoder preset).
    pub fn set_position(&mut self, position: i32) {
        self.position = position;
        self.position_remainder = 0;
    }

    /// Mode of operation in effect.
    pub const fn active_mode(&self) -> Option<ModeOfOperation> {
        self.active_mode
    }

    /// Configure the mode of operation before activation.
    pub fn configure_mode(&mut self, mode: ModeOfOperation) {
        self.configured_mode = Some(mode);
        self.active_mode = Some(mode);
    }

    /// Trigger a drive fault that persists for `condition_cycles` cycles.
    pub fn inject_fault(&mut self, condition_cycles: u32) {
        debug!("Simulated drive: fault injected ({condition_cycles} cycles)");
        self.state = DriveState::FaultReactionActive;
        self.fault_condition_cycles = condition_cycles;
    }

    /// Statusword reported to the host.
    pub fn status_word(&self) -> u16 {
        let mut status = StatusWord::from_bits_retain(self.state.status_word()) | StatusWord::REMOTE;
        if matches!(
            self.state,
            DriveState::ReadyToSwitchOn
                | DriveState::SwitchedOn
                | DriveState::OperationEnabled
                | DriveState::QuickStopActive
        ) {
            status |= StatusWord::VOLTAGE_ENABLED;
        }
        status.bits()
    }

    /// Advance the drive by one cycle with the host's outputs.
    pub fn cycle(&mut self, outputs: &DriveOutputs, dt: Duration) {
        self.fault_condition_cycles = self.fault_condition_cycles.saturating_sub(1);
        if let Some(mode) = ModeOfOperation::from_u8(outputs.mode) {
            self.active_mode = Some(mode);
        }

        let command = decode(outputs.control_word, self.last_control);
        self.last_control = outputs.control_word;
        let previous = self.state;
        self.state = self.next_state(command, outputs.control_word);
        if self.state != previous {
            debug!(
                "Simulated drive: {:?} → {:?} (control=0x{:04X})",
                previous, self.state, outputs.control_word
            );
        }

        if self.state == DriveState::OperationEnabled {
            self.follow(outputs, dt);
        }
    }

    fn next_state(&mut self, command: Command, control: u16) -> DriveState {
        use DriveState::*;

        match (self.state, command) {
            (NotReadyToSwitchOn, _) => {
                self.boot_cycles = self.boot_cycles.saturating_sub(1);
                if self.boot_cycles == 0 {
                    SwitchOnDisabled
                } else {
                    NotReadyToSwitchOn
                }
            }
            (FaultReactionActive, _) => Fault,
            (Fault, _) => {
                // Level-sensitive: the host keeps the reset bit asserted.
                let reset = control & ControlWord::FAULT_RESET.bits() != 0;
                if reset && self.fault_condition_cycles == 0 {
                    SwitchOnDisabled
                } else {
                    Fault
                }
            }
            (SwitchOnDisabled, Command::Shutdown) => ReadyToSwitchOn,
            (ReadyToSwitchOn, Command::SwitchOn) => SwitchedOn,
            (ReadyToSwitchOn, Command::EnableOperation) => SwitchedOn,
            (SwitchedOn, Command::EnableOperation) => OperationEnabled,
            (SwitchedOn, Command::Shutdown) => ReadyToSwitchOn,
            (OperationEnabled, Command::SwitchOn) => SwitchedOn,
            (OperationEnabled, Command::Shutdown) => ReadyToSwitchOn,
            (OperationEnabled, Command::QuickStop) => QuickStopActive,
            (QuickStopActive, Command::DisableVoltage) => SwitchOnDisabled,
            (QuickStopActive, Command::EnableOperation) => OperationEnabled,
            (ReadyToSwitchOn | SwitchedOn | OperationEnabled, Command::DisableVoltage)
            | (ReadyToSwitchOn | SwitchedOn | OperationEnabled, Command::QuickStop) => {
                SwitchOnDisabled
            }
            (state, _) => state,
        }
    }

    fn follow(&mut self, outputs: &DriveOutputs, dt: Duration) {
        match self.active_mode {
            Some(ModeOfOperation::CyclicSyncPosition) => {
                self.position = outputs.target_position;
                self.position_remainder = 0;
            }
            Some(ModeOfOperation::CyclicSyncVelocity) => {
                let delta = outputs.target_velocity as i128 * dt.as_nanos() as i128
                    + self.position_remainder;
                let whole = delta / NANOS_PER_SEC;
                self.position_remainder = delta % NANOS_PER_SEC;
                self.position = self.position.wrapping_add(whole as i32);
            }
            None => {}
        }
        trace!("Simulated drive: position={}", self.position);
    }
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new()
    }
}
