//! Integration tests for the ecat motor control unit.
//!
//! These tests run the cycle against the simulated master and drive,
//! covering bring-up, the CiA-402 power sequence, deadline arithmetic under
//! jitter, cooperative shutdown and setup failures.

mod integration;
