//! Self-tests da malha de eventos: rings, routing, workflows e o caminho
//! completo ring → ingest → Guide → decks → Execution → ResultRing.

use core::alloc::Layout;
use core::mem::offset_of;

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::process::{self, ProcessState};
use crate::sys::ErrorCode;

use super::deck::{PREFIX_HARDWARE, PREFIX_OPERATIONS};
use super::decks::hardware::{self, HW_TIMER_SLEEP};
use super::decks::operations::{crc32_of, OP_CRC32};
use super::guide;
use super::ring::{EventRing, ResultRing, RingEvent, RingResult, RING_CAPACITY};
use super::routing::{EntryState, StepResult, ROUTING_TABLE};
use super::workflow::{self, ErrorPolicy, NodeSpec, WorkflowState};

pub const EVENT_TESTS: &[TestCase] = &[
    TestCase::new("ring_fifo_sem_perda", test_ring_fifo),
    TestCase::new("ring_cheio_e_reuso", test_ring_full),
    TestCase::new("ring_layout_abi", test_ring_layout),
    TestCase::new("routing_ingest_copia_profunda", test_routing_ingest),
    TestCase::new("routing_cursor_monotonico", test_routing_cursor),
    TestCase::new("step_result_serializacao", test_step_result_serialization),
    TestCase::new("workflow_rejeita_ciclo", test_workflow_cycle),
    TestCase::new("workflow_valida_dependencias", test_workflow_bad_deps),
    TestCase::new("workflow_vazio_completa_na_ativacao", test_workflow_empty),
    TestCase::new("workflow_dag_paralelo", test_workflow_parallel_dag),
    TestCase::new("workflow_skip_transitivo", test_workflow_skip),
    TestCase::new("workflow_retry_com_backoff", test_workflow_retry),
    TestCase::new("hardware_sleep_suspende_entry", test_hardware_sleep),
    TestCase::new("e2e_crc32_ring_a_ring", test_end_to_end_crc32),
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Rings são grandes demais para a stack: vive no heap, zerado.
fn alloc_zeroed_ring<T>() -> *mut T {
    // SAFETY: layout não-nulo; o chamador libera com free_ring.
    unsafe { alloc::alloc::alloc_zeroed(Layout::new::<T>()) as *mut T }
}

fn free_ring<T>(ptr: *mut T) {
    // SAFETY: alocado acima com o mesmo layout.
    unsafe { alloc::alloc::dealloc(ptr as *mut u8, Layout::new::<T>()) }
}

const OPS_ROUTE: [u8; 8] = [PREFIX_OPERATIONS, 0, 0, 0, 0, 0, 0, 0];

fn reap(pid: u64) {
    process::with_process(pid, |p| p.state = ProcessState::Zombie);
    process::destroy(pid);
}

// ---------------------------------------------------------------------------
// Rings SPSC
// ---------------------------------------------------------------------------

/// FIFO estrito: o que sai é prefixo do que entrou, byte a byte.
fn test_ring_fifo() -> TestResult {
    let ring_ptr = alloc_zeroed_ring::<EventRing>();
    crate::kassert!(!ring_ptr.is_null());
    // SAFETY: recém-alocado e zerado, uso exclusivo deste teste.
    let ring = unsafe { &*ring_ptr };

    crate::kassert!(ring.is_empty());

    let payloads: [&[u8]; 3] = [b"primeiro", b"segundo", b"terceiro"];
    for (i, payload) in payloads.iter().enumerate() {
        let event = RingEvent::new(42, OP_CRC32 + i as u32, OPS_ROUTE, payload);
        crate::kassert!(ring.push(&event));
    }
    crate::kassert_eq!(ring.len(), 3);

    let mut out = RingEvent::empty();
    for (i, payload) in payloads.iter().enumerate() {
        crate::kassert!(ring.pop(&mut out));
        crate::kassert_eq!(out.event_type, OP_CRC32 + i as u32);
        crate::kassert_eq!(out.payload_size as usize, payload.len());
        crate::kassert!(&out.payload[..payload.len()] == *payload);
        crate::kassert_eq!(out.workflow_id, 42);
    }

    // Vazio de novo: pop falha sem consumir nada
    crate::kassert!(!ring.pop(&mut out));
    crate::kassert!(ring.is_empty());

    free_ring(ring_ptr);
    TestResult::Pass
}

/// Capacidade: push falha com 256 pendentes e volta a aceitar após um pop.
fn test_ring_full() -> TestResult {
    let ring_ptr = alloc_zeroed_ring::<ResultRing>();
    crate::kassert!(!ring_ptr.is_null());
    // SAFETY: recém-alocado e zerado, uso exclusivo deste teste.
    let ring = unsafe { &*ring_ptr };

    let mut record = RingResult::empty();
    for i in 0..RING_CAPACITY {
        record.event_id = i as u64;
        crate::kassert!(ring.push(&record));
    }
    crate::kassert!(ring.is_full());
    record.event_id = 9999;
    crate::kassert!(!ring.push(&record));

    let mut out = RingResult::empty();
    crate::kassert!(ring.pop(&mut out));
    crate::kassert_eq!(out.event_id, 0);

    // Um slot liberou
    record.event_id = 256;
    crate::kassert!(ring.push(&record));

    free_ring(ring_ptr);
    TestResult::Pass
}

/// O layout de 576 bytes é ABI: stubs de usuário dependem destes offsets.
fn test_ring_layout() -> TestResult {
    crate::kassert_eq!(offset_of!(RingEvent, event_id), 0);
    crate::kassert_eq!(offset_of!(RingEvent, workflow_id), 8);
    crate::kassert_eq!(offset_of!(RingEvent, event_type), 16);
    // Gap de 4 bytes após o type alinha o timestamp em 8
    crate::kassert_eq!(offset_of!(RingEvent, timestamp), 24);
    crate::kassert_eq!(offset_of!(RingEvent, route), 32);
    crate::kassert_eq!(offset_of!(RingEvent, payload), 40);
    crate::kassert_eq!(offset_of!(RingEvent, payload_size), 552);

    crate::kassert_eq!(offset_of!(RingResult, event_id), 0);
    crate::kassert_eq!(offset_of!(RingResult, workflow_id), 8);
    crate::kassert_eq!(offset_of!(RingResult, completion_time), 16);
    crate::kassert_eq!(offset_of!(RingResult, status), 24);
    crate::kassert_eq!(offset_of!(RingResult, error_code), 28);
    crate::kassert_eq!(offset_of!(RingResult, result_size), 32);
    crate::kassert_eq!(offset_of!(RingResult, result), 36);
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Routing table
// ---------------------------------------------------------------------------

/// O ingest atribui id/timestamp e copia o payload para o kernel.
fn test_routing_ingest() -> TestResult {
    let event = RingEvent::new(7, OP_CRC32, OPS_ROUTE, b"ingest!");

    let Some(id_a) = ROUTING_TABLE.add_from_ring_event(&event) else {
        return TestResult::Fail;
    };
    let Some(id_b) = ROUTING_TABLE.add_from_ring_event(&event) else {
        return TestResult::Fail;
    };

    // Ids monotônicos e globalmente únicos
    crate::kassert!(id_b > id_a);
    crate::kassert!(id_a != 0);
    crate::kassert!(ROUTING_TABLE.contains(id_a));

    let checked = ROUTING_TABLE.with_entry_mut(id_a, |entry| {
        entry.current_index == 0
            && entry.state == EntryState::Processing
            && entry.workflow_id == 7
            && entry.event.data() == b"ingest!"
            && entry.created_at != 0
            && entry.route == OPS_ROUTE
    });
    crate::kassert_eq!(checked, Some(true));

    // take remove exatamente uma vez
    crate::kassert!(ROUTING_TABLE.take(id_a).is_some());
    crate::kassert!(ROUTING_TABLE.take(id_a).is_none());
    crate::kassert!(ROUTING_TABLE.take(id_b).is_some());
    TestResult::Pass
}

/// `current_index` só cresce; cada passo recebe no máximo um resultado.
fn test_routing_cursor() -> TestResult {
    let event = RingEvent::new(7, OP_CRC32, [1, 2, 0, 0, 0, 0, 0, 0], b"x");
    let Some(id) = ROUTING_TABLE.add_from_ring_event(&event) else {
        return TestResult::Fail;
    };

    let ok = ROUTING_TABLE.with_entry_mut(id, |entry| {
        let before = entry.current_index;
        entry.complete_step(Some(StepResult::Value(1)));
        let mid = entry.current_index;
        entry.complete_step(None);
        let after = entry.current_index;

        before == 0
            && mid == 1
            && after == 2
            && entry.step_results[0].is_some()
            && entry.step_results[1].is_none() // passo sem resultado
            && entry.step_stamps[0] != 0
            && entry.current_prefix() == 0 // rota esgotada
    });
    crate::kassert_eq!(ok, Some(true));

    crate::kassert!(ROUTING_TABLE.take(id).is_some());
    TestResult::Pass
}

/// Cada variante do resultado tipado serializa com o tamanho real.
fn test_step_result_serialization() -> TestResult {
    let mut buf = [0u8; 64];

    let value = StepResult::Value(0x1122_3344_5566_7788);
    crate::kassert_eq!(value.copy_to(&mut buf), 8);
    crate::kassert_eq!(buf[0], 0x88); // little-endian
    crate::kassert_eq!(value.byte_len(), 8);

    let static_data = StepResult::Static(b"abc");
    crate::kassert_eq!(static_data.copy_to(&mut buf), 3);
    crate::kassert!(&buf[..3] == b"abc");

    let heap = StepResult::Heap(alloc::vec![1u8, 2, 3, 4, 5].into_boxed_slice());
    crate::kassert_eq!(heap.copy_to(&mut buf), 5);
    crate::kassert_eq!(heap.byte_len(), 5);
    drop(heap); // Heap libera no drop — sem vazamento

    let mapped = StepResult::Mapped { phys: 0x1000, pages: 1 };
    crate::kassert_eq!(mapped.copy_to(&mut buf), 8);
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Workflow engine
// ---------------------------------------------------------------------------

/// Qualquer ciclo no DAG rejeita o registro.
fn test_workflow_cycle() -> TestResult {
    // 0 → 1 → 0
    let specs = [
        NodeSpec::new(OP_CRC32, b"a", &[1]),
        NodeSpec::new(OP_CRC32, b"b", &[0]),
    ];
    let result = workflow::register("ciclo", OPS_ROUTE, &specs, 0);
    crate::kassert_eq!(result, Err(ErrorCode::WorkflowCyclicDag));

    // Auto-dependência também é ciclo
    let specs = [NodeSpec::new(OP_CRC32, b"a", &[0])];
    let result = workflow::register("auto", OPS_ROUTE, &specs, 0);
    crate::kassert_eq!(result, Err(ErrorCode::WorkflowCyclicDag));
    TestResult::Pass
}

/// Índice de dependência fora do DAG rejeita o registro.
fn test_workflow_bad_deps() -> TestResult {
    let specs = [
        NodeSpec::new(OP_CRC32, b"a", &[]),
        NodeSpec::new(OP_CRC32, b"b", &[5]),
    ];
    let result = workflow::register("dep_fora", OPS_ROUTE, &specs, 0);
    crate::kassert_eq!(result, Err(ErrorCode::InvalidParameter));
    TestResult::Pass
}

/// Ativar um workflow sem eventos completa imediatamente.
fn test_workflow_empty() -> TestResult {
    let Ok(id) = workflow::register("vazio", OPS_ROUTE, &[], 0) else {
        return TestResult::Fail;
    };
    crate::kassert!(workflow::activate(id, None).is_ok());
    crate::kassert_eq!(workflow::poll_state(id), Some(WorkflowState::Completed));
    crate::kassert!(workflow::unregister(id).is_ok());
    TestResult::Pass
}

/// A e B independentes rodam na primeira leva; C só depois de ambos.
fn test_workflow_parallel_dag() -> TestResult {
    let specs = [
        NodeSpec::new(OP_CRC32, b"a", &[]),
        NodeSpec::new(OP_CRC32, b"b", &[]),
        NodeSpec::new(OP_CRC32, b"c", &[0, 1]),
    ];
    let Ok(id) = workflow::register("paralelo", OPS_ROUTE, &specs, 0) else {
        return TestResult::Fail;
    };
    crate::kassert!(workflow::activate(id, None).is_ok());

    // Primeira leva: A e B submetidos, C segurado (dependências pendentes)
    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    crate::kassert!(snap.node_event_ids[0] != 0);
    crate::kassert!(snap.node_event_ids[1] != 0);
    crate::kassert_eq!(snap.node_event_ids[2], 0);
    crate::kassert_eq!(ROUTING_TABLE.len(), 2);

    // Pump 1: A e B completam; o callback libera e submete C
    guide::pump_all();
    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    crate::kassert_eq!(snap.completed, 2);
    crate::kassert!(snap.node_event_ids[2] != 0);

    // Pump 2: C completa; o workflow fecha exatamente uma vez
    guide::pump_all();
    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    crate::kassert_eq!(snap.completed, 3);
    crate::kassert_eq!(snap.state, WorkflowState::Completed);
    crate::kassert!(ROUTING_TABLE.is_empty());

    crate::kassert!(workflow::unregister(id).is_ok());
    TestResult::Pass
}

/// Política Skip: A falha (permanente) ⇒ B e C marcados "dependency
/// failed" transitiva e imediatamente, sem submissão.
fn test_workflow_skip() -> TestResult {
    // Network Deck sempre falha com NetNotConnected (não-transiente)
    let net_route: [u8; 8] = [4, 0, 0, 0, 0, 0, 0, 0];
    let specs = [
        NodeSpec::new(400, b"", &[]),
        NodeSpec::new(400, b"", &[0]),
        NodeSpec::new(400, b"", &[1]),
    ];
    let Ok(id) = workflow::register("cadeia_skip", net_route, &specs, 0) else {
        return TestResult::Fail;
    };
    crate::kassert!(workflow::configure(id, ErrorPolicy::Skip, None).is_ok());
    crate::kassert!(workflow::activate(id, None).is_ok());

    // Só A foi submetido
    crate::kassert_eq!(ROUTING_TABLE.len(), 1);

    guide::pump_all();

    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    // A falhou; B e C nunca foram submetidos e estão com erro
    crate::kassert_eq!(snap.completed, 0);
    crate::kassert_eq!(snap.errors, 3);
    crate::kassert_eq!(snap.state, WorkflowState::Error);
    crate::kassert_eq!(snap.node_event_ids[1], 0);
    crate::kassert_eq!(snap.node_event_ids[2], 0);
    crate::kassert!(ROUTING_TABLE.is_empty());

    crate::kassert!(workflow::unregister(id).is_ok());
    TestResult::Pass
}

/// Retry com backoff real: resubmissões respeitam o tick de vencimento e
/// o nó é submetido no máximo 1 + max_retries vezes.
fn test_workflow_retry() -> TestResult {
    let specs = [NodeSpec::new(OP_CRC32, b"r", &[])];
    let Ok(id) = workflow::register("retry", OPS_ROUTE, &specs, 0) else {
        return TestResult::Fail;
    };
    crate::kassert!(workflow::configure(id, ErrorPolicy::Retry, None).is_ok());
    crate::kassert!(workflow::activate(id, None).is_ok());

    let now = crate::drivers::timer::ticks();
    let mut submissions = 0u32;

    // Submissão original
    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    let mut event_id = snap.node_event_ids[0];
    crate::kassert!(event_id != 0);
    crate::kassert!(ROUTING_TABLE.take(event_id).is_some());
    submissions += 1;

    // Três falhas transientes: cada retry só reaparece após o vencimento
    for attempt in 1..=3u8 {
        workflow::on_event_completed(id, event_id, None, 0, Some(ErrorCode::StorageDiskFull));

        // Cedo demais: nada resubmetido
        workflow::poll_retries(now);
        crate::kassert!(ROUTING_TABLE.is_empty());

        // Depois do prazo (100/200/400ms ⇒ ≤ 80 ticks), o nó volta
        workflow::poll_retries(now + 100);
        let Some(snap) = workflow::inspect(id) else {
            return TestResult::Fail;
        };
        let new_event_id = snap.node_event_ids[0];
        crate::kassert!(new_event_id > event_id);
        crate::kassert_eq!(snap.retry_counts[0], attempt);
        crate::kassert!(ROUTING_TABLE.take(new_event_id).is_some());
        submissions += 1;
        event_id = new_event_id;
    }

    // Quarta falha: orçamento esgotado ⇒ erro permanente, sem resubmissão
    workflow::on_event_completed(id, event_id, None, 0, Some(ErrorCode::StorageDiskFull));
    workflow::poll_retries(now + 10_000);
    crate::kassert!(ROUTING_TABLE.is_empty());

    let Some(snap) = workflow::inspect(id) else {
        return TestResult::Fail;
    };
    crate::kassert_eq!(snap.state, WorkflowState::Error);
    crate::kassert_eq!(snap.retry_counts[0], 3);
    crate::kassert_eq!(submissions, 1 + 3);

    crate::kassert!(workflow::unregister(id).is_ok());
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Hardware Deck: caminho Suspend
// ---------------------------------------------------------------------------

/// O sleep destaca a entry do fluxo; a expiração a devolve e a rota segue.
fn test_hardware_sleep() -> TestResult {
    let route: [u8; 8] = [PREFIX_HARDWARE, 0, 0, 0, 0, 0, 0, 0];
    let sleep_ms: u64 = 20;
    let event = RingEvent::new(0, HW_TIMER_SLEEP, route, &sleep_ms.to_le_bytes());
    let Some(id) = ROUTING_TABLE.add_from_ring_event(&event) else {
        return TestResult::Fail;
    };

    // Pump: o deck suspende em vez de completar
    guide::pump_all();
    let state = ROUTING_TABLE.with_entry_mut(id, |e| e.state);
    crate::kassert_eq!(state, Some(EntryState::Suspended));

    // Pumps seguintes ignoram a entry suspensa
    guide::pump_all();
    crate::kassert!(ROUTING_TABLE.contains(id));

    // Expiração: a entry volta ao fluxo com o cursor avançado
    hardware::poll_timers(crate::drivers::timer::ticks() + 1_000);
    let check = ROUTING_TABLE.with_entry_mut(id, |e| {
        e.state == EntryState::Processing && e.current_index == 1
    });
    crate::kassert_eq!(check, Some(true));

    // Rota esgotada → Execution remove a entry
    guide::pump_all();
    crate::kassert!(!ROUTING_TABLE.contains(id));
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Ponta a ponta
// ---------------------------------------------------------------------------

/// Cenário completo: processo submete um CRC32 pelo EventRing, o kernel
/// ingere, os decks processam e o resultado volta pelo ResultRing com a
/// flag de conclusão acesa. A tabela termina vazia.
fn test_end_to_end_crc32() -> TestResult {
    let payload: &[u8] = b"Hello from Ring 3!";

    let Ok(wf) = workflow::register("rt_crc32", OPS_ROUTE, &[], 0) else {
        return TestResult::Fail;
    };
    let Some(pid) = process::create(&[0xEB, 0xFE], 0) else {
        return TestResult::Fail;
    };
    process::set_current(Some(pid));

    // Usuário (simulado) empurra o evento no EventRing do processo
    let pushed = process::with_process(pid, |proc| {
        let event = RingEvent::new(wf, OP_CRC32, OPS_ROUTE, payload);
        // SAFETY: rings do próprio processo, identity-mapped.
        unsafe { (*proc.event_ring).push(&event) }
    });
    crate::kassert_eq!(pushed, Some(true));

    // SUBMIT: ingest valida e move para a routing table
    let ingested = crate::syscall::drain_event_ring(pid, wf);
    crate::kassert_eq!(ingested, 1);
    crate::kassert_eq!(ROUTING_TABLE.len(), 1);

    // O pump leva o evento até o Execution stage
    guide::pump_all();
    guide::pump_all();

    // Resultado no ResultRing: status 0, id atribuído, CRC correto
    let mut out = RingResult::empty();
    let popped = process::with_process(pid, |proc| {
        // SAFETY: rings do próprio processo.
        unsafe { (*proc.result_ring).pop(&mut out) }
    });
    crate::kassert_eq!(popped, Some(true));
    crate::kassert_eq!(out.status, 0);
    crate::kassert_eq!(out.workflow_id, wf);
    crate::kassert!(out.event_id != 0);
    crate::kassert_eq!(out.result_size, 8); // Value serializado em LE
    let expected = crc32_of(payload);
    crate::kassert_eq!(
        u32::from_le_bytes([out.result[0], out.result[1], out.result[2], out.result[3]]),
        expected
    );

    // O completion signal marcou a flag do processo corrente
    let flagged = process::with_process(pid, |proc| {
        proc.completion_ready
            .load(core::sync::atomic::Ordering::SeqCst)
    });
    crate::kassert_eq!(flagged, Some(true));

    // Nada ficou para trás
    crate::kassert!(ROUTING_TABLE.is_empty());

    process::set_current(None);
    reap(pid);
    crate::kassert!(workflow::unregister(wf).is_ok());
    TestResult::Pass
}

pub fn run_event_tests() {
    run_test_suite("event", EVENT_TESTS);
}
