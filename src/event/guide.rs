//! Guide — pastoreia os eventos pela rota.
//!
//! O Guide possui uma fila por deck mais a fila do Execution stage, e drena
//! a routing table em varreduras (scans):
//! - entry `Processing` cujo cursor aponta um prefixo ≠ 0 → fila do deck
//!   (se ainda não enfileirada);
//! - rota esgotada (prefixo 0) ou entry abortada → fila do Execution;
//! - `Suspended` → ignorada (o dono do suspend a retoma).
//!
//! A ordem da rota é preservada POR entry (só se enfileira no cursor
//! atual); entre entries não há ordem — um evento posterior pode concluir
//! antes de um anterior.
//!
//! O ciclo completo (`pump_all`) roda uma vez por tick do timer e, como
//! gatilho secundário, no caminho de yield cooperativo.

use core::sync::atomic::{AtomicU64, Ordering};

use super::deck::{deck_for, DeckQueue, DECKS};
use super::execution;
use super::routing::{EntryState, ROUTING_TABLE};

/// Estado do Guide: filas + estatísticas.
struct Guide {
    /// Uma fila por prefixo de deck (índice = prefixo - 1).
    deck_queues: [DeckQueue; 4],
    execution_queue: DeckQueue,
    events_routed: AtomicU64,
    events_completed: AtomicU64,
    iterations: AtomicU64,
}

static GUIDE: Guide = Guide {
    deck_queues: [const { DeckQueue::new() }; 4],
    execution_queue: DeckQueue::new(),
    events_routed: AtomicU64::new(0),
    events_completed: AtomicU64::new(0),
    iterations: AtomicU64::new(0),
};

pub fn init() {
    crate::kinfo!("(Guide) Inicializado (4 filas de deck + fila de execução)");
}

/// Uma varredura da routing table, roteando cada entry para a fila devida.
fn scan() {
    ROUTING_TABLE.for_each_mut(|entry| {
        if entry.queued {
            return;
        }

        match entry.state {
            EntryState::Suspended => {}

            EntryState::Completed | EntryState::Aborted => {
                entry.queued = true;
                GUIDE.execution_queue.push(entry.event_id);
            }

            EntryState::Processing => {
                let prefix = entry.current_prefix();
                if prefix == 0 {
                    // Rota esgotada → Execution stage
                    entry.state = EntryState::Completed;
                    entry.queued = true;
                    GUIDE.execution_queue.push(entry.event_id);
                } else if deck_for(prefix).is_some() {
                    entry.queued = true;
                    GUIDE.deck_queues[(prefix - 1) as usize].push(entry.event_id);
                    GUIDE.events_routed.fetch_add(1, Ordering::Relaxed);
                } else {
                    // Prefixo fora de 0..=4: rota corrompida
                    entry.fail(
                        crate::sys::ErrorCode::InvalidParameter,
                        "prefixo de rota inválido",
                    );
                    entry.queued = true;
                    GUIDE.execution_queue.push(entry.event_id);
                }
            }
        }
    });
}

/// Drena as filas dos decks até a quiescência, em ordem de prefixo.
fn pump_decks() {
    for deck in &DECKS {
        let queue = &GUIDE.deck_queues[(deck.prefix - 1) as usize];
        while let Some(event_id) = queue.pop() {
            ROUTING_TABLE.with_entry_mut(event_id, |entry| {
                entry.queued = false;
                (deck.process)(entry);
                deck.stats.record(entry);
            });
        }
    }
}

/// Drena a fila do Execution stage.
fn pump_execution() {
    while let Some(event_id) = GUIDE.execution_queue.pop() {
        if execution::run_one(event_id) {
            GUIDE.events_completed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// O ciclo completo: scan → decks → scan (promove recém-esgotadas) →
/// Execution stage.
pub fn pump_all() {
    scan();
    pump_decks();
    scan();
    pump_execution();

    GUIDE.iterations.fetch_add(1, Ordering::Relaxed);
}

/// Estatísticas do Guide.
pub fn print_stats() {
    crate::kprintln!(
        "[Guide] roteados={} concluidos={} iteracoes={}",
        GUIDE.events_routed.load(Ordering::Relaxed),
        GUIDE.events_completed.load(Ordering::Relaxed),
        GUIDE.iterations.load(Ordering::Relaxed)
    );
}
