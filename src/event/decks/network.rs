//! Network Deck — reservado.
//!
//! O prefixo 4 existe na ABI de rotas, mas não há stack de rede neste
//! kernel: toda requisição falha com `NetNotConnected`. O deck fica
//! registrado para que rotas que o mencionem errem de forma limpa em vez
//! de travar o Guide.

use crate::event::routing::RoutingEntry;
use crate::sys::ErrorCode;

/// Processa (rejeita) um evento do Network Deck.
pub fn process(entry: &mut RoutingEntry) {
    let event_type = entry.event.event_type;

    if !(400..500).contains(&event_type) {
        entry.fail(
            ErrorCode::InvalidParameter,
            "tipo fora da faixa do Network Deck (400..499)",
        );
        return;
    }

    entry.fail(ErrorCode::NetNotConnected, "network deck reservado");
}
