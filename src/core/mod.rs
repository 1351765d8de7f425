//! Núcleo do kernel: boot, logging, panic e handoff do bootloader.

pub mod entry;
pub mod handoff;
pub mod logging;
pub mod panic;
