//! Process data domain.
//!
//! The domain is the byte image of one bus cycle: inputs filled by
//! `receive()`, outputs written by the cycle, the whole buffer consumed by
//! `send()`. Multi-byte values are little-endian (EtherCAT byte order).
//!
//! Two access levels:
//! - [`ProcessDataDomain`] reads and writes at raw byte offsets and panics
//!   on out-of-range access.
//! - [`MappedDomain`] binds a domain to [`PdoOffsets`] checked against that
//!   domain's size once at startup; per-cycle accessors carry only a debug
//!   assertion.

use ecat_common::bus::{BusMaster, SlaveAddress};
use ecat_common::cia402::{
    CONTROLWORD, MODES_OF_OPERATION, ObjectIndex, POSITION_ACTUAL, STATUSWORD, TARGET_POSITION,
    TARGET_VELOCITY,
};
use thiserror::Error;
use tracing::debug;

/// Offset resolution and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The master has no mapping for the entry on this slave.
    #[error("PDO entry {object} not mapped on slave {slave}")]
    Unresolved {
        /// Slave address.
        slave: SlaveAddress,
        /// Object address.
        object: ObjectIndex,
    },

    /// The entry does not fit inside the domain.
    #[error("PDO entry {object} at offset {offset} (+{width} bytes) exceeds domain of {size} bytes")]
    OutOfBounds {
        /// Object address.
        object: ObjectIndex,
        /// Resolved byte offset.
        offset: usize,
        /// Entry width in bytes.
        width: usize,
        /// Domain size in bytes.
        size: usize,
    },
}

// ─── Raw Domain ─────────────────────────────────────────────────────

/// Fixed-size process data buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDataDomain {
    data: Box<[u8]>,
}

impl ProcessDataDomain {
    /// Zero-filled domain of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Domain size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the domain has no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Buffer handed to the bus master's `send()`.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Buffer handed to the bus master's `receive()`.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    #[track_caller]
    fn get<const N: usize>(&self, offset: usize) -> [u8; N] {
        let end = self.end_of::<N>(offset);
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[offset..end]);
        out
    }

    #[inline]
    #[track_caller]
    fn put<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) {
        let end = self.end_of::<N>(offset);
        self.data[offset..end].copy_from_slice(&bytes);
    }

    #[inline]
    #[track_caller]
    fn end_of<const N: usize>(&self, offset: usize) -> usize {
        match offset.checked_add(N) {
            Some(end) if end <= self.data.len() => end,
            _ => panic!(
                "domain access of {N} bytes at offset {offset} out of range (size {})",
                self.data.len()
            ),
        }
    }

    /// Read an unsigned byte.
    ///
    /// # Panics
    /// Panics if `offset` is outside the domain.
    #[track_caller]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.get::<1>(offset)[0]
    }

    /// Read a little-endian u16.
    ///
    /// # Panics
    /// Panics if the two bytes at `offset` are not inside the domain.
    #[track_caller]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.get(offset))
    }

    /// Read a little-endian u32.
    ///
    /// # Panics
    /// Panics if the four bytes at `offset` are not inside the domain.
    #[track_caller]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.get(offset))
    }

    /// Read a little-endian i32.
    #[track_caller]
    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.get(offset))
    }

    /// Write an unsigned byte.
    #[track_caller]
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.put(offset, [value]);
    }

    /// Write a little-endian u16.
    #[track_caller]
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.put(offset, value.to_le_bytes());
    }

    /// Write a little-endian u32.
    #[track_caller]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.put(offset, value.to_le_bytes());
    }

    /// Write a little-endian i32.
    #[track_caller]
    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.put(offset, value.to_le_bytes());
    }
}

// ─── PDO Offsets ────────────────────────────────────────────────────

/// Byte offsets of the six drive variables inside the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoOffsets {
    /// Statusword 0x6041:00 (u16, input).
    pub statusword: usize,
    /// Controlword 0x6040:00 (u16, output).
    pub controlword: usize,
    /// Position actual value 0x6064:00 (i32, input).
    pub actual_position: usize,
    /// Target position 0x607A:00 (i32, output).
    pub target_position: usize,
    /// Target velocity 0x60FF:00 (i32, output).
    pub target_velocity: usize,
    /// Modes of operation 0x6060:00 (u8, output).
    pub mode_of_operation: usize,
}

impl PdoOffsets {
    /// Resolve all six offsets on `slave` through the bus master.
    ///
    /// # Errors
    /// `DomainError::Unresolved` for the first entry the master cannot place.
    pub fn resolve<B: BusMaster + ?Sized>(
        master: &B,
        slave: SlaveAddress,
    ) -> Result<Self, DomainError> {
        let lookup = |object: ObjectIndex| {
            master
                .domain_offset(slave, object)
                .ok_or(DomainError::Unresolved { slave, object })
        };

        let offsets = Self {
            statusword: lookup(STATUSWORD)?,
            controlword: lookup(CONTROLWORD)?,
            actual_position: lookup(POSITION_ACTUAL)?,
            target_position: lookup(TARGET_POSITION)?,
            target_velocity: lookup(TARGET_VELOCITY)?,
            mode_of_operation: lookup(MODES_OF_OPERATION)?,
        };
        debug!("PDO offsets for slave {slave}: {offsets:?}");
        Ok(offsets)
    }

    fn entries(&self) -> [(ObjectIndex, usize, usize); 6] {
        [
            (STATUSWORD, self.statusword, 2),
            (CONTROLWORD, self.controlword, 2),
            (POSITION_ACTUAL, self.actual_position, 4),
            (TARGET_POSITION, self.target_position, 4),
            (TARGET_VELOCITY, self.target_velocity, 4),
            (MODES_OF_OPERATION, self.mode_of_operation, 1),
        ]
    }

    /// Check that every variable's full width lies inside a domain of `size` bytes.
    pub fn validate(&self, size: usize) -> Result<(), DomainError> {
        for (object, offset, width) in self.entries() {
            let fits = offset.checked_add(width).is_some_and(|end| end <= size);
            if !fits {
                return Err(DomainError::OutOfBounds {
                    object,
                    offset,
                    width,
                    size,
                });
            }
        }
        Ok(())
    }
}

// ─── Mapped Domain ──────────────────────────────────────────────────

/// A domain bound to offsets validated against it.
///
/// Neither the buffer length nor the offsets can change after
/// construction, so typed accessors skip the range check in release builds.
#[derive(Debug, Clone)]
pub struct MappedDomain {
    domain: ProcessDataDomain,
    offsets: PdoOffsets,
}

impl MappedDomain {
    /// Bind `offsets` to `domain`.
    ///
    /// # Errors
    /// `DomainError::OutOfBounds` if any variable does not fit.
    pub fn new(domain: ProcessDataDomain, offsets: PdoOffsets) -> Result<Self, DomainError> {
        offsets.validate(domain.len())?;
        Ok(Self { domain, offsets })
    }

    /// Offsets in use.
    pub const fn offsets(&self) -> &PdoOffsets {
        &self.offsets
    }

    /// Underlying domain.
    pub const fn domain(&self) -> &ProcessDataDomain {
        &self.domain
    }

    /// Buffer for the bus master's `receive()`.
    #[inline]
    pub fn rx_buffer(&mut self) -> &mut [u8] {
        self.domain.as_bytes_mut()
    }

    /// Buffer for the bus master's `send()`.
    #[inline]
    pub fn tx_buffer(&self) -> &[u8] {
        self.domain.as_bytes()
    }

    #[inline]
    fn load<const N: usize>(&self, offset: usize) -> [u8; N] {
        debug_assert!(offset + N <= self.domain.len());
        // SAFETY: `offsets` was validated against this buffer in `new()` and
        // neither can change afterwards.
        unsafe { *(self.domain.data.as_ptr().add(offset) as *const [u8; N]) }
    }

    #[inline]
    fn store<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) {
        debug_assert!(offset + N <= self.domain.len());
        // SAFETY: see `load`.
        unsafe { *(self.domain.data.as_mut_ptr().add(offset) as *mut [u8; N]) = bytes }
    }

    /// Statusword (0x6041).
    #[inline]
    pub fn status_word(&self) -> u16 {
        u16::from_le_bytes(self.load(self.offsets.statusword))
    }

    /// Position actual value (0x6064) [counts].
    #[inline]
    pub fn actual_position(&self) -> i32 {
        i32::from_le_bytes(self.load(self.offsets.actual_position))
    }

    /// Controlword (0x6040).
    #[inline]
    pub fn set_control_word(&mut self, control: u16) {
        self.store(self.offsets.controlword, control.to_le_bytes());
    }

    /// Modes of operation (0x6060).
    #[inline]
    pub fn set_mode_of_operation(&mut self, mode: u8) {
        self.store(self.offsets.mode_of_operation, [mode]);
    }

    /// Target position (0x607A) [counts].
    #[inline]
    pub fn set_target_position(&mut self, target: i32) {
        self.store(self.offsets.target_position, target.to_le_bytes());
    }

    /// Target velocity (0x60FF) [counts/s].
    #[inline]
    pub fn set_target_velocity(&mut self, target: i32) {
        self.store(self.offsets.target_velocity, target.to_le_bytes());
    }
}
