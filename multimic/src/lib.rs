//! multimic library
//!
//! This module re-exports the recorder's modules for the binary and for
//! integration testing.

pub mod cli;
pub mod config;
pub mod recorder;
pub mod selector;
pub mod wav;
