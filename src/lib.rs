//! Headless MIDI router and clock generator for single-board-computer
//! hosts: routes messages between MIDI ports through a configurable
//! filter pipeline and drives an internal MIDI clock generator.

#[macro_use]
pub mod logger;

pub mod cli;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod filter;
pub mod message;
pub mod registry;
pub mod routing;
