//! Os decks de processamento.
//!
//! Quatro estágios uniformes atrás da mesma interface (`deck::Deck`):
//! - Operations (1) — computação pura (hash, compressão, cifra).
//! - Storage (2) — memória + tag-store.
//! - Hardware (3) — timers e dispositivos; único dono do caminho Suspend.
//! - Network (4) — reservado.
//!
//! O Execution stage (prefixo implícito 0) vive em `event::execution`.

pub mod hardware;
pub mod network;
pub mod operations;
pub mod storage;

use super::deck::DECKS;
use core::sync::atomic::Ordering;

/// Loga o registro dos decks (estado estático, nada a construir).
pub fn init() {
    for deck in &DECKS {
        crate::kinfo!("(Deck) registrado: {} (prefixo {})", deck.name, deck.prefix);
    }
    hardware::init();
}

/// Estatísticas por deck.
pub fn print_stats() {
    for deck in &DECKS {
        crate::kprintln!(
            "[Deck {}] processados={} erros={}",
            deck.name,
            deck.stats.processed.load(Ordering::Relaxed),
            deck.stats.errors.load(Ordering::Relaxed)
        );
    }
}
