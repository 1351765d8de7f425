//! HAL — Hardware Abstraction Layer.
//!
//! Isola o restante do kernel dos detalhes da arquitetura. O contrato é a
//! trait `CpuOps`; a implementação concreta vive em `x86_64`.

pub mod traits;
pub mod x86_64;

// Plataforma ativa (única por enquanto).
pub use x86_64 as platform;
pub use x86_64::cpu::X64Cpu as Cpu;
