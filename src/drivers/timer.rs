//! Driver do PIT (Programmable Interval Timer) — Intel 8253/8254.
//!
//! ## Responsabilidades
//! 1. Gerar o "heartbeat" do sistema (IRQ0 a 100 Hz = 10 ms por tick).
//! 2. Contabilizar o tempo global (`TICKS`).
//! 3. A cada tick: bombear a malha de eventos (Guide/decks/retries) e
//!    acionar o tick do scheduler (preempção como backstop).

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::arch::platform::idt::ContextFrame;
use crate::arch::platform::ports::outb;

// Portas de I/O do PIT
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

// Frequência base do oscilador (~1.193182 MHz)
const PIT_BASE_FREQ: u32 = 1_193_182;

/// Frequência padrão do sistema (100 Hz → 10 ms por tick).
pub const SYSTEM_HZ: u32 = 100;

// Contador global de ticks (relógio monotônico)
pub static TICKS: AtomicU64 = AtomicU64::new(0);

// Frequência atual configurada
static FREQUENCY: AtomicU32 = AtomicU32::new(0);

/// Inicializa o PIT com a frequência especificada.
///
/// # Returns
/// Frequência real configurada (pode diferir pela precisão do divisor).
pub fn init(freq_hz: u32) -> u32 {
    if freq_hz == 0 || freq_hz > PIT_BASE_FREQ {
        return 0;
    }

    let divisor = PIT_BASE_FREQ / freq_hz;
    let divisor = if divisor > 65_535 { 65_535 } else { divisor as u16 };
    let actual_freq = PIT_BASE_FREQ / divisor as u32;
    FREQUENCY.store(actual_freq, Ordering::Relaxed);

    // Canal 0, lo/hi byte, Modo 3 (square wave)
    outb(PIT_COMMAND, 0x36);
    outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
    outb(PIT_CHANNEL0, (divisor >> 8) as u8);

    actual_freq
}

/// Tick atual do sistema.
#[inline]
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Converte milissegundos em ticks (arredonda para cima, mínimo 1).
pub fn ms_to_ticks(ms: u64) -> u64 {
    let per_tick = 1000 / SYSTEM_HZ as u64;
    let t = ms.div_ceil(per_tick);
    if t == 0 {
        1
    } else {
        t
    }
}

/// Corpo da IRQ0. O EOI já foi enviado pelo handler de interrupção.
pub fn on_tick(frame: &mut ContextFrame) {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    // 1. Malha de eventos: timers suspensos, retries agendados e uma
    //    passada completa do Guide (scan → decks → scan → execution).
    crate::event::on_tick(now);

    // 2. Scheduler: watchdog + preempção por time slice.
    crate::sched::tick(frame);
}
