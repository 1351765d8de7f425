//! Utilitários internos do kernel.

pub mod test_framework;
