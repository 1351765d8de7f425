//! Definições de Sistema.

pub mod error;
pub mod test;

pub use error::{ErrorCode, Severity};
