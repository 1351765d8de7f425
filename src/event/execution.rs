//! Execution Stage — parada final de toda entry.
//!
//! Para cada entry concluída (rota esgotada) ou abortada:
//! 1. retira a entry da routing table (posse única a partir daqui);
//! 2. monta o `RingResult` — o último resultado não-vazio da rota é
//!    serializado POR VALOR no registro, com o tamanho real;
//! 3. empurra no ResultRing do processo que submeteu o evento (spin
//!    limitado ~10 ms; se o usuário não drena, o resultado é descartado e
//!    contabilizado — nunca bloquear o kernel);
//! 4. dispara o completion signal (int 0x81) para acordar quem espera —
//!    incondicionalmente: o waiter pode estar parado num idle loop;
//! 5. chama o workflow engine com a POSSE do resultado (move — nunca há
//!    dois donos); isso pode submeter novos eventos;
//! 6. descarta os demais resultados por tipo (o drop do `StepResult` cuida
//!    de `Heap`; `Mapped` fica para o teardown do processo).

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

use super::ring::RingResult;
use super::routing::{RoutingEntry, StepResult, ROUTING_TABLE};
use super::workflow;
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;

/// Tentativas de push antes de descartar (~10 ms com PAUSE).
const MAX_PUSH_ATTEMPTS: u32 = 10_000;

struct ExecutionStats {
    executed: AtomicU64,
    responses_sent: AtomicU64,
    dropped_results: AtomicU64,
    errors: AtomicU64,
}

static STATS: ExecutionStats = ExecutionStats {
    executed: AtomicU64::new(0),
    responses_sent: AtomicU64::new(0),
    dropped_results: AtomicU64::new(0),
    errors: AtomicU64::new(0),
};

pub fn init() {
    crate::kinfo!("(Execution) Stage inicializado");
}

/// Dispara o completion signal. Interrupção de software — sem EOI.
fn raise_completion_signal() {
    // SAFETY: vetor 0x81 é dedicado ao completion handler.
    unsafe {
        asm!("int 0x81", options(nomem, nostack));
    }
}

/// Monta o registro de conclusão a partir da entry.
fn collect_result(entry: &RoutingEntry) -> RingResult {
    let mut result = RingResult::empty();
    result.event_id = entry.event_id;
    result.workflow_id = entry.workflow_id;
    result.completion_time = Cpu::rdtsc();

    let error_raw = entry.error.map(|e| e.as_u32()).unwrap_or(0);
    result.status = if entry.aborted { error_raw } else { 0 };
    result.error_code = error_raw;

    if let Some(index) = entry.last_result_index() {
        if let Some(step) = entry.step_results[index].as_ref() {
            result.result_size = step.copy_to(&mut result.result) as u32;
        }
    }

    result
}

/// Empurra o resultado no ResultRing do processo de origem da entry
/// (quem submeteu recebe — mesmo que outro processo esteja rodando, ou
/// nenhum). Submissões internas do kernel não têm ring de destino.
fn push_result(origin_pid: Option<u64>, result: &RingResult) -> bool {
    let ring_ptr = origin_pid
        .and_then(|pid| crate::process::with_process(pid, |proc| proc.result_ring))
        .or_else(|| crate::process::with_current(|proc| proc.result_ring));

    let Some(ring_ptr) = ring_ptr else {
        // Submissão do kernel (retry/ativação): o callback do workflow é o
        // único consumidor do resultado.
        return false;
    };

    // SAFETY: o ponteiro aponta para a região de rings do processo,
    // identity-mapped e viva enquanto o processo existir.
    let ring = unsafe { &*ring_ptr };

    let mut attempts = 0u32;
    while !ring.push(result) {
        attempts += 1;
        if attempts >= MAX_PUSH_ATTEMPTS {
            crate::kerror!(
                "(Execution) ResultRing cheio após {} tentativas (evento {}) — resultado descartado",
                MAX_PUSH_ATTEMPTS,
                result.event_id
            );
            STATS.dropped_results.fetch_add(1, Ordering::Relaxed);
            STATS.errors.fetch_add(1, Ordering::Relaxed);
            return true; // havia processo; o descarte já foi contabilizado
        }
        Cpu::pause();
    }

    STATS.responses_sent.fetch_add(1, Ordering::Relaxed);
    true
}

/// Descarta os resultados restantes conforme o tipo.
fn dispose_remaining(entry: &mut RoutingEntry) {
    for slot in entry.step_results.iter_mut() {
        match slot.take() {
            None => {}
            Some(StepResult::Mapped { phys, pages }) => {
                // Unmap adiado: a região segue viva até o teardown do
                // processo dono.
                crate::kdebug!(
                    "(Execution) resultado mapeado {:#x} ({} págs) fica até o teardown",
                    phys,
                    pages
                );
            }
            // Value/Static: nada a liberar. Heap: liberado pelo drop aqui.
            Some(_other) => {}
        }
    }
}

/// Processa uma entry vinda da fila do Execution stage.
/// Retorna false se a entry já não existe (nada a fazer).
pub fn run_one(event_id: u64) -> bool {
    let Some(mut entry) = ROUTING_TABLE.take(event_id) else {
        return false;
    };

    // 1-2. Resultado serializado por valor
    let result = collect_result(&entry);

    // 3. Entregar no ring de quem submeteu e acordar quem espera. O
    //    signal dispara SEMPRE: um waiter pode estar parado no idle loop
    //    sem processo corrente algum.
    push_result(entry.origin_pid, &result);
    raise_completion_signal();

    // 4. Transferir a posse do último resultado ao workflow (move único)
    let transferred = entry
        .last_result_index()
        .and_then(|index| entry.step_results[index].take());
    let transferred_size = transferred.as_ref().map(|r| r.byte_len()).unwrap_or(0) as u64;

    workflow::on_event_completed(
        entry.workflow_id,
        entry.event_id,
        transferred,
        transferred_size,
        entry.error,
    );

    // 5. Descarte tipado do que sobrou; 6. a entry (já fora da tabela)
    // morre no fim deste escopo.
    dispose_remaining(&mut entry);

    STATS.executed.fetch_add(1, Ordering::Relaxed);
    true
}

/// Estatísticas do Execution stage.
pub fn print_stats() {
    crate::kprintln!(
        "[Execution] executados={} respostas={} descartados={} erros={}",
        STATS.executed.load(Ordering::Relaxed),
        STATS.responses_sent.load(Ordering::Relaxed),
        STATS.dropped_results.load(Ordering::Relaxed),
        STATS.errors.load(Ordering::Relaxed)
    );
}
