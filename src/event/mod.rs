//! Malha de Eventos — o coração do Helm.
//!
//! Fluxo de uma submissão:
//!
//! ```text
//! user ──push──► EventRing ──int 0x80 (SUBMIT)──► ingest do kernel
//!                                                       │
//!                                                 Routing Table
//!                                                       │
//!                                   Guide drena → filas por deck
//!                                                       │
//!                                 decks processam na ordem da rota
//!                                                       │
//!                                  Execution coleta o resultado
//!                                       │                │
//!                                 ResultRing     workflow::on_event_completed
//!                                       │                │
//!                user pops ◄── completion signal    pode submeter mais
//! ```

pub mod deck;
pub mod decks;
pub mod execution;
pub mod guide;
pub mod ring;
pub mod routing;
pub mod test;
pub mod workflow;

use core::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Inicializa a malha de eventos em ordem determinística.
/// Chamar exatamente uma vez no boot; nunca reinicializar.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        crate::kwarn!("(Event) init chamado duas vezes — ignorado");
        return;
    }

    routing::init();
    guide::init();
    decks::init();
    execution::init();
    workflow::init();

    crate::kinfo!("(Event) Malha de eventos inicializada");
}

/// Marca a malha como ativa (eventos passam a ser processados).
pub fn start() {
    RUNNING.store(true, Ordering::SeqCst);
    crate::kinfo!("(Event) Malha de eventos ATIVA");
}

/// Para a malha (shutdown gracioso).
pub fn stop() {
    RUNNING.store(false, Ordering::SeqCst);
    crate::kinfo!("(Event) Malha de eventos parada");
}

/// A malha está ativa?
pub fn is_running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}

/// Trabalho periódico, chamado uma vez por tick do timer (IRQ0):
/// timers suspensos, retries agendados e uma passada completa do Guide.
pub fn on_tick(now_tick: u64) {
    if !is_running() {
        return;
    }

    decks::hardware::poll_timers(now_tick);
    workflow::poll_retries(now_tick);
    guide::pump_all();
}

/// Estatísticas agregadas de toda a malha.
pub fn print_full_stats() {
    crate::kprintln!();
    crate::kprintln!("=== ESTATISTICAS DA MALHA DE EVENTOS ===");
    routing::print_stats();
    guide::print_stats();
    decks::print_stats();
    execution::print_stats();
    workflow::print_stats();
    crate::sched::print_stats();

    let (used, total) = crate::mm::pmm::FRAME_ALLOCATOR.lock().usage();
    crate::kprintln!(
        "[Mem] frames={}/{} heap={} bytes",
        used,
        total,
        crate::mm::heap::allocated_bytes()
    );
}
