//! Primitivas de Sincronização.
//!
//! Kernel single-CPU: o Spinlock aqui existe para exclusão mútua contra
//! handlers de interrupção (mascara IF enquanto o lock está em posse).

pub mod spinlock;

pub use spinlock::Spinlock;
