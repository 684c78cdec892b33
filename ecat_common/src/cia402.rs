//! CiA-402 drive profile definitions.
//!
//! Object dictionary indices for the cyclic process data, status/control
//! word bit layouts, drive states and modes of operation. Shared by the
//! control unit (host side) and the simulated drive (device side).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ─── Object Dictionary ──────────────────────────────────────────────

/// An object dictionary entry address (index, sub-index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIndex {
    /// 16-bit object index.
    pub index: u16,
    /// 8-bit sub-index.
    pub subindex: u8,
}

impl ObjectIndex {
    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }
}

impl std::fmt::Display for ObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}:{:02X}", self.index, self.subindex)
    }
}

/// Controlword (RxPDO, u16).
pub const CONTROLWORD: ObjectIndex = ObjectIndex::new(0x6040, 0x00);
/// Statusword (TxPDO, u16).
pub const STATUSWORD: ObjectIndex = ObjectIndex::new(0x6041, 0x00);
/// Modes of operation (RxPDO, u8).
pub const MODES_OF_OPERATION: ObjectIndex = ObjectIndex::new(0x6060, 0x00);
/// Position actual value (TxPDO, i32).
pub const POSITION_ACTUAL: ObjectIndex = ObjectIndex::new(0x6064, 0x00);
/// Target position (RxPDO, i32).
pub const TARGET_POSITION: ObjectIndex = ObjectIndex::new(0x607A, 0x00);
/// Target velocity (RxPDO, i32).
pub const TARGET_VELOCITY: ObjectIndex = ObjectIndex::new(0x60FF, 0x00);

// ─── Status / Control Words ─────────────────────────────────────────

bitflags! {
    /// Statusword bits (0x6041).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusWord: u16 {
        const READY_TO_SWITCH_ON = 0x0001;
        const SWITCHED_ON        = 0x0002;
        const OPERATION_ENABLED  = 0x0004;
        const FAULT              = 0x0008;
        const VOLTAGE_ENABLED    = 0x0010;
        /// Active low: cleared while a quick stop is in progress.
        const QUICK_STOP         = 0x0020;
        const SWITCH_ON_DISABLED = 0x0040;
        const WARNING            = 0x0080;
        const REMOTE             = 0x0200;
        const TARGET_REACHED     = 0x0400;
    }
}

bitflags! {
    /// Controlword bits (0x6040).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlWord: u16 {
        const SWITCH_ON        = 0x0001;
        const ENABLE_VOLTAGE   = 0x0002;
        /// Active low: clearing it requests a quick stop.
        const QUICK_STOP       = 0x0004;
        const ENABLE_OPERATION = 0x0008;
        /// Operation-mode specific (new set-point in profile modes).
        const OMS_NEW_SETPOINT = 0x0010;
        const FAULT_RESET      = 0x0080;
        const HALT             = 0x0100;
    }
}

impl ControlWord {
    /// Disable voltage; also the answer to an active quick stop.
    pub const DISABLE_VOLTAGE: Self = Self::empty();
    /// Shutdown: Switch-on disabled → Ready to switch on.
    pub const SHUTDOWN: Self = Self::ENABLE_VOLTAGE.union(Self::QUICK_STOP);
    /// Switch on: Ready to switch on → Switched on.
    pub const SWITCH_ON_CMD: Self = Self::SHUTDOWN.union(Self::SWITCH_ON);
    /// Enable operation: Switched on → Operation enabled.
    pub const ENABLE_OPERATION_CMD: Self = Self::SWITCH_ON_CMD.union(Self::ENABLE_OPERATION);
    /// Keep operating with the set-point bit asserted.
    pub const OPERATE: Self = Self::ENABLE_OPERATION_CMD.union(Self::OMS_NEW_SETPOINT);
    /// Fault reset (rising edge acknowledges the fault).
    pub const RESET: Self = Self::FAULT_RESET;
}

// ─── Drive States ───────────────────────────────────────────────────

/// CiA-402 power state as classified from the statusword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DriveState {
    NotReadyToSwitchOn = 0,
    SwitchOnDisabled = 1,
    ReadyToSwitchOn = 2,
    SwitchedOn = 3,
    OperationEnabled = 4,
    QuickStopActive = 5,
    FaultReactionActive = 6,
    Fault = 7,
    /// Statusword matched no known pattern.
    Unclassified = 8,
}

impl DriveState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotReadyToSwitchOn),
            1 => Some(Self::SwitchOnDisabled),
            2 => Some(Self::ReadyToSwitchOn),
            3 => Some(Self::SwitchedOn),
            4 => Some(Self::OperationEnabled),
            5 => Some(Self::QuickStopActive),
            6 => Some(Self::FaultReactionActive),
            7 => Some(Self::Fault),
            8 => Some(Self::Unclassified),
            _ => None,
        }
    }

    /// Canonical statusword a device reports while in this state.
    ///
    /// `Unclassified` maps to `0x006F`, a pattern no classification rule matches.
    pub const fn status_word(self) -> u16 {
        match self {
            Self::NotReadyToSwitchOn => 0x0000,
            Self::SwitchOnDisabled => 0x0040,
            Self::ReadyToSwitchOn => 0x0021,
            Self::SwitchedOn => 0x0023,
            Self::OperationEnabled => 0x0027,
            Self::QuickStopActive => 0x0007,
            Self::FaultReactionActive => 0x000F,
            Self::Fault => 0x0008,
            Self::Unclassified => 0x006F,
        }
    }

    /// Whether the host may issue motion set-points in this state.
    #[inline]
    pub const fn allows_motion(self) -> bool {
        matches!(self, Self::OperationEnabled)
    }

    /// Whether the drive is in one of the fault branches.
    #[inline]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::FaultReactionActive | Self::Fault)
    }
}

impl Default for DriveState {
    fn default() -> Self {
        Self::NotReadyToSwitchOn
    }
}

// ─── Modes of Operation ─────────────────────────────────────────────

/// Modes of operation (0x6060) used by this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModeOfOperation {
    /// Cyclic synchronous position.
    CyclicSyncPosition = 8,
    /// Cyclic synchronous velocity.
    CyclicSyncVelocity = 9,
}

impl ModeOfOperation {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            8 => Some(Self::CyclicSyncPosition),
            9 => Some(Self::CyclicSyncVelocity),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}
