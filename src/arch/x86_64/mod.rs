//! Implementação x86-64 do HAL.

pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod ports;
