//! `kernel_notify` — a ÚNICA syscall do sistema (int 0x80, DPL 3).
//!
//! ```text
//! kernel_notify(workflow_id, flags)   RDI = workflow_id, RSI = flags
//! ```
//!
//! | Flag   | Comportamento |
//! |--------|---------------|
//! | SUBMIT | Drena o EventRing validando cada registro; retorna o nº ingerido |
//! | WAIT   | Flag de conclusão já setada → retorna; senão Waiting + yield |
//! | POLL   | 0 = Completed, 1 = em voo, -1 = desconhecido (não bloqueia) |
//! | YIELD  | Yield cooperativo incondicional |
//! | EXIT   | Processo vira Zombie e cede; nunca retorna ao chamador |
//!
//! Combinações são processadas em ordem SUBMIT → WAIT → POLL → YIELD →
//! EXIT; o primeiro modo que cede a CPU encerra a invocação (o frame já
//! pertence a outro processo depois de um yield).
//!
//! Erros de validação retornam negativos distintos; bits desconhecidos são
//! rejeitados.
//!
//! O vetor 0x81 (DPL 0) é o completion signal: marca a flag de conclusão
//! do processo corrente (best-effort) e devolve TODO processo Waiting à
//! ready queue. Interrupção de software — sem EOI.

use bitflags::bitflags;

use crate::arch::platform::idt::ContextFrame;
use crate::drivers::timer;
use crate::event::deck::{EVENT_TYPE_MAX, EVENT_TYPE_MIN};
use crate::event::ring::{RingEvent, EVENT_PAYLOAD_SIZE};
use crate::event::routing::ROUTING_TABLE;
use crate::event::workflow::{self, WorkflowState};
use crate::process::{self, Pid, ProcessState, MAX_PROCESSES};

bitflags! {
    /// Bits de modo do kernel_notify.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NotifyFlags: u64 {
        const SUBMIT = 0x01;
        const WAIT = 0x02;
        const POLL = 0x04;
        const YIELD = 0x08;
        const EXIT = 0x10;
    }
}

// Retornos de erro de validação (negativos distintos)
const ERR_NO_PROCESS: i64 = -1;
const ERR_UNKNOWN_WORKFLOW: i64 = -1;
const ERR_BAD_FLAGS: i64 = -3;
const ERR_NO_RINGS: i64 = -4;
const ERR_NO_OP: i64 = -5;

#[inline]
fn ret(frame: &mut ContextFrame, value: i64) {
    frame.rax = value as u64;
}

/// Handler da int 0x80.
pub fn kernel_notify(frame: &mut ContextFrame) {
    let workflow_id = frame.rdi;
    let raw_flags = frame.rsi;

    // 1. Processo corrente existe?
    let Some(current) = process::current_pid() else {
        crate::kerror!("(Syscall) kernel_notify sem processo corrente");
        ret(frame, ERR_NO_PROCESS);
        return;
    };

    // Contabilidade (o watchdog vive disso)
    process::with_process(current, |proc| {
        proc.syscall_count += 1;
        proc.last_syscall_tick = timer::ticks();
    });

    // 2. Flags válidas, ao menos uma
    let Some(flags) = NotifyFlags::from_bits(raw_flags) else {
        crate::kwarn!("(Syscall) flags inválidas {:#x} de PID={}", raw_flags, current);
        ret(frame, ERR_BAD_FLAGS);
        return;
    };
    if flags.is_empty() {
        ret(frame, ERR_NO_OP);
        return;
    }

    // 3. Rings prontos
    let rings_ok = process::with_process(current, |proc| {
        !proc.event_ring.is_null() && !proc.result_ring.is_null()
    })
    .unwrap_or(false);
    if !rings_ok {
        ret(frame, ERR_NO_RINGS);
        return;
    }

    // === SUBMIT: ingerir o EventRing ===
    if flags.contains(NotifyFlags::SUBMIT) {
        let ingested = drain_event_ring(current, workflow_id);
        ret(frame, ingested);
        if flags == NotifyFlags::SUBMIT {
            return;
        }
    }

    // === WAIT: bloquear até a conclusão (yield cooperativo) ===
    if flags.contains(NotifyFlags::WAIT) {
        do_wait(frame, current, workflow_id);
        return;
    }

    // === POLL: estado do workflow, sem bloquear ===
    if flags.contains(NotifyFlags::POLL) {
        let answer = match workflow::poll_state(workflow_id) {
            Some(WorkflowState::Completed) => 0,
            Some(_) => 1,
            None => ERR_UNKNOWN_WORKFLOW,
        };
        ret(frame, answer);
        return;
    }

    // === YIELD: ceder a CPU voluntariamente ===
    if flags.contains(NotifyFlags::YIELD) {
        crate::ktrace!("(Syscall) YIELD explícito de PID={}", current);
        // Valor de retorno visto quando o processo acordar
        ret(frame, 0);
        crate::sched::yield_now(frame);
        return;
    }

    // === EXIT: terminar o processo corrente ===
    if flags.contains(NotifyFlags::EXIT) {
        crate::kinfo!("(Syscall) EXIT de PID={}", current);
        process::with_process(current, |proc| {
            proc.state = ProcessState::Zombie;
        });
        crate::sched::yield_now(frame);
        // Só se chega aqui no frame de OUTRO processo (ou idle); o Zombie
        // nunca recebe controle de volta.
        return;
    }
}

/// SUBMIT: drena o EventRing do processo validando cada registro copiado.
/// (Exposto também para os self-tests dirigirem o caminho de ingest.)
pub fn drain_event_ring(current: Pid, workflow_id: u64) -> i64 {
    let Some(ring_ptr) = process::with_process(current, |proc| proc.event_ring) else {
        return ERR_NO_PROCESS;
    };

    // SAFETY: região dos rings do processo, identity-mapped, viva enquanto
    // o processo existir (e estamos no contexto dele).
    let ring = unsafe { &*ring_ptr };

    let mut ingested: i64 = 0;
    let mut rejected: u64 = 0;
    let mut event = RingEvent::empty();

    // Drenar TUDO (batch), validando a CÓPIA de cada registro
    while ring.pop(&mut event) {
        // a) workflow do registro bate com o argumento da syscall
        if event.workflow_id != workflow_id {
            crate::kwarn!(
                "(Syscall) evento com workflow_id={} ≠ {} — pulado",
                event.workflow_id,
                workflow_id
            );
            rejected += 1;
            continue;
        }

        // b) payload dentro do limite
        if event.payload_size as usize > EVENT_PAYLOAD_SIZE {
            crate::kwarn!(
                "(Syscall) payload_size={} inválido — pulado",
                event.payload_size
            );
            rejected += 1;
            continue;
        }

        // c) tipo dentro da faixa conhecida
        if event.event_type < EVENT_TYPE_MIN || event.event_type > EVENT_TYPE_MAX {
            crate::kwarn!("(Syscall) tipo de evento {} fora da faixa — pulado", event.event_type);
            rejected += 1;
            continue;
        }

        // Atravessa para o kernel: id + timestamp + deep copy
        if ROUTING_TABLE.add_from_ring_event(&event).is_some() {
            ingested += 1;
        } else {
            rejected += 1;
        }
    }

    crate::kdebug!(
        "(Syscall) SUBMIT de PID={}: {} ingeridos, {} rejeitados",
        current,
        ingested,
        rejected
    );
    ingested
}

/// WAIT: retorna já se a conclusão chegou; senão avança a malha uma vez e,
/// se ainda nada, marca Waiting e cede.
fn do_wait(frame: &mut ContextFrame, current: Pid, workflow_id: u64) {
    if !workflow::exists(workflow_id) {
        ret(frame, ERR_UNKNOWN_WORKFLOW);
        return;
    }

    // Conclusão já sinalizada (chegou durante o SUBMIT)?
    let already = process::with_process(current, |proc| {
        proc.completion_ready
            .swap(false, core::sync::atomic::Ordering::SeqCst)
    })
    .unwrap_or(false);
    if already {
        ret(frame, 0);
        return;
    }

    // O trabalho avança antes do processo ser suspenso: com sorte a
    // conclusão cai aqui e nem precisamos bloquear.
    crate::event::on_tick(timer::ticks());

    let done = process::with_process(current, |proc| {
        proc.completion_ready
            .swap(false, core::sync::atomic::Ordering::SeqCst)
    })
    .unwrap_or(false);
    if done {
        ret(frame, 0);
        return;
    }

    // Bloquear de verdade: Waiting + yield. O 0 em RAX fica salvo no
    // contexto e é o retorno visto quando o completion signal acordar o
    // processo.
    ret(frame, 0);
    process::with_process(current, |proc| {
        proc.state = ProcessState::Waiting;
        proc.current_workflow_id = workflow_id;
    });
    crate::ktrace!(
        "(Syscall) PID={} WAIT no workflow {} — yield cooperativo",
        current,
        workflow_id
    );
    crate::sched::yield_now(frame);
}

/// Handler da int 0x81 (completion signal, somente kernel).
pub fn completion_signal(_frame: &mut ContextFrame) {
    // Flag no processo corrente (best-effort: pode não ser o que espera)
    process::with_current(|proc| {
        proc.completion_ready
            .store(true, core::sync::atomic::Ordering::SeqCst);
    });

    // Acordar TODO processo Waiting (cada um re-checa sua flag no WAIT)
    let mut waiting: [Pid; MAX_PROCESSES] = [0; MAX_PROCESSES];
    let mut count = 0usize;
    process::for_each_mut(|proc| {
        if proc.state == ProcessState::Waiting && count < MAX_PROCESSES {
            waiting[count] = proc.pid;
            count += 1;
        }
    });

    for &pid in &waiting[..count] {
        crate::sched::add(pid);
        crate::ktrace!("(Completion) PID={} acordado", pid);
    }

    // Sem EOI — interrupção de software.
}
