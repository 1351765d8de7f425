//! Scheduler Híbrido Orientado a Eventos.
//!
//! PRIMÁRIO: scheduling cooperativo dirigido por workflows —
//! `kernel_notify(WAIT)` cede a CPU, o completion signal devolve o
//! processo à ready queue, `kernel_notify(YIELD)` cede explicitamente.
//!
//! SECUNDÁRIO: preempção por timer como proteção de liveness — time slice
//! grande (10 ticks = 100 ms a 100 Hz) porque preempção deve ser RARA;
//! quem dita o ritmo são os waits de workflow.
//!
//! TERCEIRO: watchdog — a cada 100 ticks, processo que não faz syscall há
//! mais de 1000 ticks (10 s) é declarado pendurado e vira Zombie.
//!
//! Ambos os pontos de entrada (`yield_now`, `tick`) recebem o frame de
//! interrupção e salvam/regravam o contexto de usuário nele: o IRETQ do
//! stub instala o próximo processo.

pub mod test;

use crate::arch::platform::gdt;
use crate::arch::platform::idt::ContextFrame;
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::process::{self, Pid, ProcessState, MAX_PROCESSES};
use crate::sync::Spinlock;

/// Time slice: 10 ticks a 100 Hz = 100 ms (GRANDE de propósito).
pub const TIME_SLICE_TICKS: i32 = 10;

/// Período do watchdog (ticks).
const WATCHDOG_PERIOD: u64 = 100;
/// Limite de inatividade de syscall (ticks) antes de declarar pendurado.
const WATCHDOG_HANG_TICKS: u64 = 1000;

/// Estatísticas acumuladas.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub context_switches: u64,
    pub preemptions: u64,
    pub voluntary_yields: u64,
    pub total_ticks: u64,
}

/// Fila circular de prontos + contadores.
struct SchedState {
    queue: [Pid; MAX_PROCESSES],
    head: usize,
    tail: usize,
    count: usize,
    time_slice: i32,
    stats: SchedulerStats,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            queue: [0; MAX_PROCESSES],
            head: 0,
            tail: 0,
            count: 0,
            time_slice: TIME_SLICE_TICKS,
            stats: SchedulerStats {
                context_switches: 0,
                preemptions: 0,
                voluntary_yields: 0,
                total_ticks: 0,
            },
        }
    }

    fn contains(&self, pid: Pid) -> bool {
        (0..self.count).any(|i| self.queue[(self.head + i) % MAX_PROCESSES] == pid)
    }

    fn push(&mut self, pid: Pid) -> bool {
        if self.count >= MAX_PROCESSES {
            return false;
        }
        // Nunca enfileirar duas vezes (wake pode correr com o yield)
        if self.contains(pid) {
            return true;
        }
        self.queue[self.tail] = pid;
        self.tail = (self.tail + 1) % MAX_PROCESSES;
        self.count += 1;
        true
    }

    fn pop(&mut self) -> Option<Pid> {
        if self.count == 0 {
            return None;
        }
        let pid = self.queue[self.head];
        self.head = (self.head + 1) % MAX_PROCESSES;
        self.count -= 1;
        Some(pid)
    }

    /// Remove um pid arbitrário (varredura linear com deslocamento).
    fn remove(&mut self, pid: Pid) -> bool {
        for i in 0..self.count {
            let idx = (self.head + i) % MAX_PROCESSES;
            if self.queue[idx] == pid {
                // Puxa os seguintes uma posição para trás
                for j in i..self.count - 1 {
                    let cur = (self.head + j) % MAX_PROCESSES;
                    let next = (self.head + j + 1) % MAX_PROCESSES;
                    self.queue[cur] = self.queue[next];
                }
                self.tail = (self.tail + MAX_PROCESSES - 1) % MAX_PROCESSES;
                self.count -= 1;
                return true;
            }
        }
        false
    }
}

static SCHED: Spinlock<SchedState> = Spinlock::new(SchedState::new());

pub fn init() {
    crate::kinfo!("(Sched) Scheduler híbrido inicializado");
    crate::kinfo!(
        "(Sched) Time slice {} ticks ({} ms) — preempção é só proteção",
        TIME_SLICE_TICKS,
        TIME_SLICE_TICKS * 10
    );
    crate::kinfo!("(Sched) Primário: cooperativo via workflows (WAIT/YIELD)");
}

// ---------------------------------------------------------------------------
// Ready queue
// ---------------------------------------------------------------------------

/// Enfileira um processo como pronto.
pub fn add(pid: Pid) {
    let ok = process::with_process(pid, |proc| {
        proc.state = ProcessState::Ready;
    })
    .is_some();
    if !ok {
        crate::kwarn!("(Sched) add de PID={} inexistente", pid);
        return;
    }

    if !SCHED.lock().push(pid) {
        crate::kerror!("(Sched) Ready queue cheia! PID={} descartado", pid);
    }
}

/// Remove um processo da ready queue.
pub fn remove(pid: Pid) {
    SCHED.lock().remove(pid);
}

/// Processos na ready queue.
pub fn ready_count() -> usize {
    SCHED.lock().count
}

/// Tira da fila o próximo processo RESTAURÁVEL: Zombies encontrados no
/// caminho (vítimas do watchdog) são destruídos aqui; slots com defeito
/// (sem CR3, sem espaço) são pulados com log em vez de corromper a CPU.
fn pick_next_runnable() -> Option<Pid> {
    loop {
        let pid = SCHED.lock().pop()?;

        match process::with_process(pid, |p| (p.state, p.cr3, p.space.is_some())) {
            None => {
                crate::kwarn!("(Sched) PID={} sumiu da tabela — pulando", pid);
            }
            Some((ProcessState::Zombie, _, _)) => {
                crate::kinfo!("(Sched) Zombie PID={} na fila — destruindo", pid);
                process::destroy(pid);
            }
            Some((_, 0, _)) => {
                crate::kerror!("(Sched) PID={} sem raiz de page table — abortando restore", pid);
            }
            Some((_, _, false)) => {
                crate::kerror!("(Sched) PID={} sem contexto de VM — abortando restore", pid);
            }
            Some(_) => return Some(pid),
        }
    }
}

/// Tira o próximo processo restaurável da fila. Usado pelo boot para o
/// primeiro `enter_usermode`.
pub fn take_next() -> Option<Pid> {
    pick_next_runnable()
}

// ---------------------------------------------------------------------------
// Troca de contexto
// ---------------------------------------------------------------------------

/// Instala `next` no frame: contexto de usuário, CR3, stack de kernel no
/// TSS, estado Running e slice novo.
fn switch_to(frame: &mut ContextFrame, next: Pid) {
    let cr3 = process::with_process(next, |proc| {
        process::restore_context(proc, frame);
        proc.state = ProcessState::Running;
        proc.cr3
    });

    let Some(cr3) = cr3 else {
        crate::kerror!("(Sched) switch_to: PID={} evaporou", next);
        return;
    };

    // SAFETY: cr3 validado em pick_next_runnable; o espaço mapeia o kernel.
    unsafe {
        Cpu::write_cr3(cr3);
    }
    gdt::tss_set_rsp0(gdt::KERNEL_INTERRUPT_STACK_TOP);

    process::set_current(Some(next));

    let mut sched = SCHED.lock();
    sched.stats.context_switches += 1;
    sched.time_slice = TIME_SLICE_TICKS;
}

/// Shutdown gracioso: nenhum processo restante no sistema.
fn graceful_shutdown() -> ! {
    crate::kinfo!("(Sched) Todos os processos terminaram");
    crate::fs::sync();
    crate::event::stop();
    crate::event::print_full_stats();
    crate::kinfo!("(Sched) Sistema ocioso — halt");

    loop {
        Cpu::enable_interrupts();
        Cpu::halt();
    }
}

/// Idle: sem processo restaurável agora, mas alguém pode voltar (completion
/// signal devolve Waiting à fila). HLT até isso acontecer.
fn idle_until_ready(frame: &mut ContextFrame) {
    process::set_current(None);
    crate::kdebug!("(Sched) Sem processos prontos — idle aguardando IRQ");

    loop {
        Cpu::enable_interrupts();
        Cpu::halt();
        Cpu::disable_interrupts();

        if let Some(next) = pick_next_runnable() {
            switch_to(frame, next);
            return;
        }

        if process::count() == 0 {
            graceful_shutdown();
        }
    }
}

/// Análise de caso comum a yield e preempção, após o save do contexto.
fn reschedule(frame: &mut ContextFrame, current: Pid, state: ProcessState) {
    match state {
        ProcessState::Running | ProcessState::Ready => {
            // Volta para o fim da fila e segue o round-robin
            add(current);
            if let Some(next) = pick_next_runnable() {
                switch_to(frame, next);
            } else {
                // Fila esvaziou (só havia ele e foi destruído? defensivo)
                idle_until_ready(frame);
            }
        }

        ProcessState::Zombie => {
            process::destroy(current);
            process::set_current(None);
            if let Some(next) = pick_next_runnable() {
                switch_to(frame, next);
            } else if process::count() == 0 {
                graceful_shutdown();
            } else {
                // Restam processos, mas todos Waiting
                idle_until_ready(frame);
            }
        }

        ProcessState::Waiting => {
            // NÃO re-enfileirar: o completion signal fará isso
            process::set_current(None);
            if let Some(next) = pick_next_runnable() {
                switch_to(frame, next);
            } else {
                idle_until_ready(frame);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pontos de entrada
// ---------------------------------------------------------------------------

/// Yield cooperativo — chamado do syscall handler (WAIT/YIELD/EXIT) e do
/// isolamento de falhas. Salva o contexto no frame e cede a CPU.
pub fn yield_now(frame: &mut ContextFrame) {
    let Some(current) = process::current_pid() else {
        return; // Nada rodando (boot cedo) — nada a ceder
    };

    SCHED.lock().stats.voluntary_yields += 1;

    // O trabalho da malha avança antes do processo ser suspenso
    crate::event::on_tick(crate::drivers::timer::ticks());

    let state = process::with_process(current, |proc| {
        process::save_context(proc, frame);
        proc.state
    });
    let Some(state) = state else {
        return;
    };

    reschedule(frame, current, state);
}

/// Tick do timer — preempção como backstop + watchdog.
pub fn tick(frame: &mut ContextFrame) {
    let total = {
        let mut sched = SCHED.lock();
        sched.stats.total_ticks += 1;
        sched.stats.total_ticks
    };

    // Watchdog periódico
    if total % WATCHDOG_PERIOD == 0 {
        watchdog(total);
    }

    let Some(current) = process::current_pid() else {
        return; // Early boot: timer ativo antes do primeiro processo
    };

    let expired = {
        let mut sched = SCHED.lock();
        sched.time_slice -= 1;
        sched.time_slice <= 0
    };
    if !expired {
        return;
    }

    // Slice estourado — caminho de preempção (deveria ser raro)
    SCHED.lock().stats.preemptions += 1;
    crate::kdebug!("(Sched) Preempção por timer de PID={}", current);

    let state = process::with_process(current, |proc| {
        process::save_context(proc, frame);
        proc.state
    });
    let Some(state) = state else {
        return;
    };

    reschedule(frame, current, state);
}

/// Watchdog: declara Zombie quem está pendurado (sem syscall há mais de
/// `WATCHDOG_HANG_TICKS`). Quem nunca fez syscall ainda está aquecendo e
/// é poupado; Waiting/Zombie também.
fn watchdog(now_tick: u64) {
    process::for_each_mut(|proc| {
        if proc.state == ProcessState::Zombie || proc.state == ProcessState::Waiting {
            return;
        }
        if proc.syscall_count == 0 {
            return;
        }
        if now_tick.saturating_sub(proc.last_syscall_tick) > WATCHDOG_HANG_TICKS {
            crate::kwarn!(
                "(Sched) Watchdog: PID={} pendurado (última syscall no tick {}) — Zombie",
                proc.pid,
                proc.last_syscall_tick
            );
            proc.state = ProcessState::Zombie;
        }
    });
}

// ---------------------------------------------------------------------------
// Estatísticas
// ---------------------------------------------------------------------------

/// Snapshot das estatísticas.
pub fn stats() -> SchedulerStats {
    SCHED.lock().stats
}

pub fn print_stats() {
    let stats = stats();
    crate::kprintln!("[Sched] trocas={} preempções={} yields={} ticks={}",
        stats.context_switches,
        stats.preemptions,
        stats.voluntary_yields,
        stats.total_ticks
    );
    crate::kprintln!("[Sched] prontos={}", ready_count());
}
