//! Self-tests do scheduler.
//!
//! Usa processos reais (criados e destruídos aqui mesmo) porque a ready
//! queue só aceita PIDs vivos da tabela.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::process::{self, ProcessState};

pub const SCHED_TESTS: &[TestCase] = &[
    TestCase::new("fila_fifo_round_robin", test_queue_fifo),
    TestCase::new("remocao_da_fila", test_queue_remove),
    TestCase::new("watchdog_marca_pendurado", test_watchdog),
];

/// Stub mínimo de código de usuário (jmp $) para popular a tabela.
const STUB: &[u8] = &[0xEB, 0xFE];

fn spawn() -> Option<u64> {
    process::create(STUB, 0)
}

fn reap(pid: u64) {
    process::with_process(pid, |p| p.state = ProcessState::Zombie);
    process::destroy(pid);
}

/// A fila é FIFO: sai na ordem em que entrou.
fn test_queue_fifo() -> TestResult {
    let (Some(a), Some(b), Some(c)) = (spawn(), spawn(), spawn()) else {
        return TestResult::Fail;
    };

    super::add(a);
    super::add(b);
    super::add(c);
    // add é idempotente para quem já está na fila
    super::add(b);
    crate::kassert_eq!(super::ready_count(), 3);

    crate::kassert_eq!(super::take_next(), Some(a));
    crate::kassert_eq!(super::take_next(), Some(b));
    crate::kassert_eq!(super::take_next(), Some(c));
    crate::kassert_eq!(super::take_next(), None);

    reap(a);
    reap(b);
    reap(c);
    TestResult::Pass
}

/// remove() tira do meio preservando a ordem dos demais.
fn test_queue_remove() -> TestResult {
    let (Some(a), Some(b), Some(c)) = (spawn(), spawn(), spawn()) else {
        return TestResult::Fail;
    };

    super::add(a);
    super::add(b);
    super::add(c);
    super::remove(b);
    crate::kassert_eq!(super::ready_count(), 2);
    crate::kassert_eq!(super::take_next(), Some(a));
    crate::kassert_eq!(super::take_next(), Some(c));
    crate::kassert_eq!(super::take_next(), None);

    reap(a);
    reap(b);
    reap(c);
    TestResult::Pass
}

/// Um processo sem syscall há mais de 1000 ticks vira Zombie; quem nunca
/// fez syscall (ainda aquecendo) e quem está Waiting são poupados.
fn test_watchdog() -> TestResult {
    let (Some(hung), Some(warming), Some(waiting)) = (spawn(), spawn(), spawn()) else {
        return TestResult::Fail;
    };

    process::with_process(hung, |p| {
        p.syscall_count = 5;
        p.last_syscall_tick = 100;
    });
    process::with_process(warming, |p| {
        p.syscall_count = 0;
    });
    process::with_process(waiting, |p| {
        p.syscall_count = 5;
        p.last_syscall_tick = 100;
        p.state = ProcessState::Waiting;
    });

    // 2000 - 100 > 1000 → só o primeiro é declarado pendurado
    super::watchdog(2000);

    let hung_state = process::with_process(hung, |p| p.state);
    let warming_state = process::with_process(warming, |p| p.state);
    let waiting_state = process::with_process(waiting, |p| p.state);
    crate::kassert_eq!(hung_state, Some(ProcessState::Zombie));
    crate::kassert_eq!(warming_state, Some(ProcessState::Ready));
    crate::kassert_eq!(waiting_state, Some(ProcessState::Waiting));

    process::destroy(hung);
    reap(warming);
    reap(waiting);
    TestResult::Pass
}

pub fn run_sched_tests() {
    run_test_suite("sched", SCHED_TESTS);
}
