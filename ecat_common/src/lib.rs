//! ecat Common Library
//!
//! Shared definitions for the ecat motion workspace: constants, the TOML
//! configuration model, CiA-402 drive profile types and the bus master
//! interface implemented by `ecat_hal`.
//!
//! # Module Structure
//!
//! - [`consts`] - Cycle timing, drive limits and defaults
//! - [`config`] - Configuration loading traits and types
//! - [`cia402`] - Object indices, status/control words, drive states
//! - [`bus`] - `BusMaster` trait and `BusError`
//! - [`prelude`] - Common re-exports for convenience

pub mod bus;
pub mod cia402;
pub mod config;
pub mod consts;
pub mod prelude;
