//! Sistema de Logging do Kernel — Helm
//! ====================================
//!
//! Logger com filtragem por nível, cores ANSI e IRQ-safe.
//!
//! # Níveis de Log
//! - `ERROR`: erros críticos (sempre visíveis)
//! - `WARN`: situações suspeitas
//! - `INFO`: fluxo normal de execução
//! - `DEBUG`: informações de debug
//! - `TRACE`: detalhes extremos
//!
//! # Segurança
//! - O Spinlock da serial mascara interrupções durante a escrita.
//! - `try_lock` evita deadlock se o log for reentrante (ex: panic dentro
//!   de um log).

use core::fmt;
use core::fmt::Write;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::drivers::serial::SERIAL1;

/// Níveis de log — valores menores = mais críticos.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Prefixo colorido ANSI para o nível.
    #[inline]
    pub fn prefix(self) -> &'static str {
        match self {
            LogLevel::Error => "\x1b[1;31m[ERRO]\x1b[0m ",
            LogLevel::Warn => "\x1b[1;33m[WARN]\x1b[0m ",
            LogLevel::Info => "\x1b[1;36m[INFO]\x1b[0m ",
            LogLevel::Debug => "\x1b[1;35m[DEBG]\x1b[0m ",
            LogLevel::Trace => "\x1b[90m[TRAC]\x1b[0m ",
        }
    }
}

// Nível máximo visível (default: Info; Debug/Trace só quando pedido)
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Ajusta o nível máximo de log em runtime.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Emite uma linha de log com prefixo de nível.
pub fn log(level: LogLevel, args: fmt::Arguments) {
    if !enabled(level) {
        return;
    }

    // try_lock: se a serial já está em posse neste contexto (log reentrante),
    // descartar é melhor que travar o kernel.
    if let Some(mut serial) = SERIAL1.try_lock() {
        let _ = serial.write_str(level.prefix());
        let _ = serial.write_fmt(args);
        let _ = serial.write_str("\n");
    }
}

/// Escrita crua, sem prefixo (usada por kprint!/kprintln!).
pub fn print(args: fmt::Arguments) {
    if let Some(mut serial) = SERIAL1.try_lock() {
        let _ = serial.write_fmt(args);
    }
}

// --- Macros de conveniência ---

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::core::logging::print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {{
        $crate::core::logging::print(format_args!($($arg)*));
        $crate::kprint!("\n");
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::core::logging::log($crate::core::logging::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::core::logging::log($crate::core::logging::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::core::logging::log($crate::core::logging::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::core::logging::log($crate::core::logging::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {
        $crate::core::logging::log($crate::core::logging::LogLevel::Trace, format_args!($($arg)*))
    };
}

/// Log de status OK (verde) — usado na sequência de boot.
#[macro_export]
macro_rules! kok {
    ($($arg:tt)*) => {{
        $crate::kprint!("\x1b[32m[OK]\x1b[0m ");
        $crate::kprintln!($($arg)*);
    }};
}

/// Log de status FAIL (vermelho).
#[macro_export]
macro_rules! kfail {
    ($($arg:tt)*) => {{
        $crate::kprint!("\x1b[1;31m[FAIL]\x1b[0m ");
        $crate::kprintln!($($arg)*);
    }};
}
