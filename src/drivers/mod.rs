//! Drivers específicos consumidos pelo core.
//!
//! Somente o trio que o kernel de workflows precisa: serial (sink de log),
//! PIC (roteamento de IRQ) e PIT (heartbeat do scheduler e da malha de
//! eventos).

pub mod pic;
pub mod serial;
pub mod timer;
