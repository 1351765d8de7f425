//! Processos de usuário e seus espaços de endereçamento.
//!
//! Cada processo roda em Ring 3 com page tables próprias (compartilhando a
//! metade do kernel) e conversa com o kernel exclusivamente pelos rings
//! compartilhados + `kernel_notify` (int 0x80).
//!
//! Mapa de memória por processo (fixo, ver ABI):
//! - `0x2000_0000` código de usuário
//! - `0x2010_0000` stack de usuário (16 KiB)
//! - `0x2020_0000` EventRing seguido imediatamente do ResultRing (user-rw)
//!
//! Invariantes:
//! - Running ⇒ CR3 válido e `space` presente.
//! - Waiting ⇒ fora da ready queue (quem devolve é o completion signal).
//! - Zombie é destruído exatamente uma vez, nunca com a CPU usando suas
//!   page tables (destroy troca para o CR3 do kernel antes).

use core::cell::UnsafeCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::arch::platform::gdt;
use crate::arch::platform::idt::ContextFrame;
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::event::ring::{EventRing, ResultRing};
use crate::mm::pmm::{self, FRAME_SIZE};
use crate::mm::vmm::{AddressSpace, PageFlags};

pub const MAX_PROCESSES: usize = 64;

pub const USER_CODE_BASE: u64 = 0x2000_0000;
pub const USER_STACK_BASE: u64 = 0x2010_0000;
pub const USER_RINGS_BASE: u64 = 0x2020_0000;
pub const USER_STACK_SIZE: usize = 16 * 1024;

/// RFLAGS inicial: IF=1 (interrupções habilitadas), IOPL=0.
const USER_RFLAGS: u64 = 0x202;

pub type Pid = u64;

/// Estado de vida de um processo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Waiting,
    Zombie,
}

/// Contexto de CPU salvo em modo usuário.
///
/// Todos os GPRs viajam junto: um processo retomado depois de uma troca de
/// contexto recebe exatamente os registradores com que entrou no kernel
/// (o RAX salvo é onde o syscall deposita o valor de retorno visto ao
/// acordar).
#[derive(Debug, Clone, Copy, Default)]
pub struct UserContext {
    pub rip: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rflags: u64,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,

    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// Um processo de usuário.
pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
    pub ctx: UserContext,

    /// Espaço de endereçamento (None só durante teardown).
    pub space: Option<AddressSpace>,
    /// Raiz física das page tables (cópia de `space` para o caminho quente).
    pub cr3: u64,

    // Regiões físicas (a posse é do AddressSpace via adopt_frames)
    pub code_phys: u64,
    pub code_size: usize,
    pub stack_phys: u64,
    pub rings_phys: u64,
    pub rings_pages: usize,

    /// Rings visíveis ao kernel via identity map (ponteiros físicos).
    pub event_ring: *mut EventRing,
    pub result_ring: *mut ResultRing,

    // Integração com workflows
    pub current_workflow_id: u64,
    pub completion_ready: AtomicBool,

    // Contadores monotônicos
    pub syscall_count: u64,
    pub creation_time: u64,
    pub last_syscall_tick: u64,
}

// ---------------------------------------------------------------------------
// Tabela de processos
// ---------------------------------------------------------------------------

/// Tabela global. Kernel single-CPU: todo acesso acontece com interrupções
/// mascaradas (syscall/IRQ) ou durante o boot — sem lock explícito, como
/// anotado no modelo de concorrência. Um port SMP exigiria lock por slot.
struct ProcessTable {
    slots: UnsafeCell<[Option<Process>; MAX_PROCESSES]>,
}

// SAFETY: single-CPU; ver comentário da struct.
unsafe impl Sync for ProcessTable {}

static TABLE: ProcessTable = ProcessTable {
    slots: UnsafeCell::new([const { None }; MAX_PROCESSES]),
};

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// PID corrente (0 = nenhum).
static CURRENT: AtomicU64 = AtomicU64::new(0);

/// Acesso cru aos slots.
///
/// # Safety
/// Chamadas não podem se aninhar sobre o mesmo slot (disciplina interna
/// deste módulo + contexto single-CPU com IF mascarado).
unsafe fn slots() -> &'static mut [Option<Process>; MAX_PROCESSES] {
    &mut *TABLE.slots.get()
}

/// Inicializa a tabela de processos.
pub fn init() {
    // SAFETY: boot single-threaded.
    unsafe {
        for slot in slots().iter_mut() {
            *slot = None;
        }
    }
    NEXT_PID.store(1, Ordering::Relaxed);
    CURRENT.store(0, Ordering::Relaxed);
    crate::kinfo!("(Process) Tabela inicializada (máx {} processos)", MAX_PROCESSES);
}

/// Executa `f` com acesso exclusivo ao processo `pid`.
pub fn with_process<R>(pid: Pid, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    // SAFETY: ver `slots`.
    unsafe {
        slots()
            .iter_mut()
            .flatten()
            .find(|p| p.pid == pid)
            .map(f)
    }
}

/// Executa `f` para cada processo vivo.
pub fn for_each_mut(mut f: impl FnMut(&mut Process)) {
    // SAFETY: ver `slots`.
    unsafe {
        for slot in slots().iter_mut() {
            if let Some(proc) = slot.as_mut() {
                f(proc);
            }
        }
    }
}

/// PID do processo corrente.
pub fn current_pid() -> Option<Pid> {
    match CURRENT.load(Ordering::Relaxed) {
        0 => None,
        pid => Some(pid),
    }
}

/// Define o processo corrente.
pub fn set_current(pid: Option<Pid>) {
    CURRENT.store(pid.unwrap_or(0), Ordering::Relaxed);
}

/// Executa `f` no processo corrente (se houver).
pub fn with_current<R>(f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    with_process(current_pid()?, f)
}

/// Processos vivos na tabela.
pub fn count() -> usize {
    // SAFETY: ver `slots`.
    unsafe { slots().iter().filter(|s| s.is_some()).count() }
}

// ---------------------------------------------------------------------------
// Criação
// ---------------------------------------------------------------------------

/// Cria um processo a partir de um blob de código e um offset de entrada.
pub fn create(code: &[u8], entry_offset: u64) -> Option<Pid> {
    // 1. Reservar um slot livre
    // SAFETY: ver `slots`.
    let slot_index = unsafe { slots().iter().position(|s| s.is_none()) };
    let Some(slot_index) = slot_index else {
        crate::kerror!("(Process) Tabela cheia!");
        return None;
    };

    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);

    // 2. Regiões físicas: stack, código, rings
    let stack_pages = USER_STACK_SIZE / FRAME_SIZE;
    let stack_phys = pmm::alloc_frames(stack_pages)?;

    let code_pages = pmm::frames_for(code.len().max(1));
    let Some(code_phys) = pmm::alloc_frames(code_pages) else {
        pmm::free_frames(stack_phys, stack_pages);
        return None;
    };

    let rings_bytes = size_of::<EventRing>() + size_of::<ResultRing>();
    let rings_pages = pmm::frames_for(rings_bytes);
    let Some(rings_phys) = pmm::alloc_frames(rings_pages) else {
        pmm::free_frames(code_phys, code_pages);
        pmm::free_frames(stack_phys, stack_pages);
        return None;
    };

    // Copiar o código e zerar stack + rings
    // SAFETY: frames recém-alocados, identity-mapped, exclusivos.
    unsafe {
        core::ptr::copy_nonoverlapping(code.as_ptr(), code_phys as *mut u8, code.len());
        core::ptr::write_bytes(stack_phys as *mut u8, 0, stack_pages * FRAME_SIZE);
        core::ptr::write_bytes(rings_phys as *mut u8, 0, rings_pages * FRAME_SIZE);
    }

    let event_ring = rings_phys as *mut EventRing;
    let result_ring = (rings_phys + size_of::<EventRing>() as u64) as *mut ResultRing;
    // SAFETY: região zerada e dimensionada acima.
    unsafe {
        EventRing::init_in_place(event_ring);
        ResultRing::init_in_place(result_ring);
    }

    // 3. Espaço de endereçamento isolado (compartilha a metade do kernel)
    let Some(mut space) = AddressSpace::new() else {
        crate::kerror!("(Process) Falha ao criar espaço de endereçamento");
        pmm::free_frames(rings_phys, rings_pages);
        pmm::free_frames(code_phys, code_pages);
        pmm::free_frames(stack_phys, stack_pages);
        return None;
    };

    // 4. Os três mapeamentos fixos do ABI
    let mappings = [
        (USER_CODE_BASE, code_phys, code_pages, PageFlags::USER_CODE),
        (USER_STACK_BASE, stack_phys, stack_pages, PageFlags::USER_RW),
        (USER_RINGS_BASE, rings_phys, rings_pages, PageFlags::USER_RW),
    ];
    for (virt, phys, pages, flags) in mappings {
        if space.map_pages(virt, phys, pages, flags).is_err() {
            crate::kerror!("(Process) Falha ao mapear {:#x} para PID={}", virt, pid);
            // O drop do space devolve tabelas; os frames soltos, aqui.
            pmm::free_frames(rings_phys, rings_pages);
            pmm::free_frames(code_phys, code_pages);
            pmm::free_frames(stack_phys, stack_pages);
            return None;
        }
    }

    // 5. A partir daqui o teardown é responsabilidade do AddressSpace
    space.adopt_frames(code_phys, code_pages);
    space.adopt_frames(stack_phys, stack_pages);
    space.adopt_frames(rings_phys, rings_pages);

    let cr3 = space.pml4_phys();

    // 6. Estado inicial de registradores (entrada em Ring 3)
    let ctx = UserContext {
        rip: USER_CODE_BASE + entry_offset,
        rsp: USER_STACK_BASE + USER_STACK_SIZE as u64 - 16,
        rbp: USER_STACK_BASE + USER_STACK_SIZE as u64 - 16,
        rflags: USER_RFLAGS,
        cs: gdt::USER_CODE,
        ss: gdt::USER_DATA,
        ds: gdt::USER_DATA,
        ..UserContext::default()
    };

    let process = Process {
        pid,
        state: ProcessState::Ready,
        ctx,
        space: Some(space),
        cr3,
        code_phys,
        code_size: code.len(),
        stack_phys,
        rings_phys,
        rings_pages,
        event_ring,
        result_ring,
        current_workflow_id: 0,
        completion_ready: AtomicBool::new(false),
        syscall_count: 0,
        creation_time: Cpu::rdtsc(),
        last_syscall_tick: 0,
    };

    // SAFETY: slot reservado acima, ainda livre (single-CPU).
    unsafe {
        slots()[slot_index] = Some(process);
    }

    crate::kinfo!(
        "(Process) PID={} criado: código {:#x} ({} bytes), rings {:#x} ({} págs)",
        pid,
        USER_CODE_BASE,
        code.len(),
        USER_RINGS_BASE,
        rings_pages
    );

    Some(pid)
}

// ---------------------------------------------------------------------------
// Transição para Ring 3
// ---------------------------------------------------------------------------

/// Entra em modo usuário no processo dado. NÃO retorna.
///
/// Troca CR3, aponta a stack de interrupção do kernel (TSS.rsp0), empilha
/// SS/RSP/RFLAGS/CS/RIP na ordem que o IRETQ exige, recarrega os segmentos
/// de dados de usuário e executa o IRETQ.
pub fn enter_usermode(pid: Pid) -> ! {
    let (ctx, cr3) = with_process(pid, |proc| {
        proc.state = ProcessState::Running;
        (proc.ctx, proc.cr3)
    })
    .expect("enter_usermode: processo inexistente");

    set_current(Some(pid));

    crate::kinfo!(
        "(Process) Entrando em Ring 3: PID={} RIP={:#x} RSP={:#x}",
        pid,
        ctx.rip,
        ctx.rsp
    );

    gdt::tss_set_rsp0(gdt::KERNEL_INTERRUPT_STACK_TOP);

    // SAFETY: o espaço do processo mapeia o kernel (herança da PML4);
    // código/stack/rings do usuário estão mapeados nele.
    unsafe {
        Cpu::write_cr3(cr3);

        core::arch::asm!(
            // Frame do IRETQ: SS, RSP, RFLAGS, CS, RIP
            "push {ss}",
            "push {rsp}",
            "push {rflags}",
            "push {cs}",
            "push {rip}",

            // Segmentos de dados do usuário
            "mov ax, {ds:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",

            // Salto para Ring 3
            "iretq",
            ss = in(reg) ctx.ss as u64,
            rsp = in(reg) ctx.rsp,
            rflags = in(reg) ctx.rflags,
            cs = in(reg) ctx.cs as u64,
            rip = in(reg) ctx.rip,
            ds = in(reg) ctx.ds,
            options(noreturn)
        );
    }
}

// ---------------------------------------------------------------------------
// Contexto (syscall/IRQ)
// ---------------------------------------------------------------------------

/// Salva o contexto de usuário a partir do frame de interrupção.
pub fn save_context(proc: &mut Process, frame: &ContextFrame) {
    let ctx = &mut proc.ctx;
    ctx.rip = frame.rip;
    ctx.rsp = frame.rsp;
    ctx.rbp = frame.rbp;
    ctx.rflags = frame.rflags;
    ctx.cs = frame.cs as u16;
    ctx.ss = frame.ss as u16;

    ctx.rax = frame.rax;
    ctx.rbx = frame.rbx;
    ctx.rcx = frame.rcx;
    ctx.rdx = frame.rdx;
    ctx.rsi = frame.rsi;
    ctx.rdi = frame.rdi;
    ctx.r8 = frame.r8;
    ctx.r9 = frame.r9;
    ctx.r10 = frame.r10;
    ctx.r11 = frame.r11;
    ctx.r12 = frame.r12;
    ctx.r13 = frame.r13;
    ctx.r14 = frame.r14;
    ctx.r15 = frame.r15;
}

/// Regrava o frame de interrupção com o contexto do processo — o IRETQ do
/// stub instala esses valores (e os pops do stub, os GPRs).
pub fn restore_context(proc: &Process, frame: &mut ContextFrame) {
    let ctx = &proc.ctx;
    frame.rip = ctx.rip;
    frame.rsp = ctx.rsp;
    frame.rbp = ctx.rbp;
    frame.rflags = ctx.rflags;
    frame.cs = ctx.cs as u64;
    frame.ss = ctx.ss as u64;

    frame.rax = ctx.rax;
    frame.rbx = ctx.rbx;
    frame.rcx = ctx.rcx;
    frame.rdx = ctx.rdx;
    frame.rsi = ctx.rsi;
    frame.rdi = ctx.rdi;
    frame.r8 = ctx.r8;
    frame.r9 = ctx.r9;
    frame.r10 = ctx.r10;
    frame.r11 = ctx.r11;
    frame.r12 = ctx.r12;
    frame.r13 = ctx.r13;
    frame.r14 = ctx.r14;
    frame.r15 = ctx.r15;
}

// ---------------------------------------------------------------------------
// Término
// ---------------------------------------------------------------------------

/// Marca o processo corrente como Zombie (falha de usuário ou EXIT).
/// A limpeza acontece na próxima decisão de scheduling.
pub fn kill_current() {
    if let Some(pid) = current_pid() {
        with_process(pid, |proc| {
            proc.state = ProcessState::Zombie;
        });
        crate::kinfo!("(Process) PID={} marcado Zombie", pid);
    }
}

/// Destrói um processo Zombie: troca para o CR3 do kernel, derruba o
/// espaço de endereçamento (libera árvore + frames adotados exatamente uma
/// vez) e zera o slot.
pub fn destroy(pid: Pid) {
    // Nunca liberar as page tables que a CPU está usando
    crate::mm::vmm::switch_to_kernel();

    // SAFETY: ver `slots`; o take() abaixo encerra qualquer alias.
    unsafe {
        let Some(slot) = slots().iter_mut().find(|s| {
            s.as_ref().map(|p| p.pid == pid).unwrap_or(false)
        }) else {
            crate::kwarn!("(Process) destroy de PID={} inexistente", pid);
            return;
        };

        match slot.as_ref().map(|p| p.state) {
            Some(ProcessState::Zombie) => {
                // O drop do Process → drop do AddressSpace → frames livres
                *slot = None;
                crate::kinfo!("(Process) PID={} destruído", pid);
            }
            Some(state) => {
                crate::kerror!(
                    "(Process) destroy ilegal: PID={} em estado {:?} (não Zombie)",
                    pid,
                    state
                );
            }
            None => {}
        }
    }

    if current_pid() == Some(pid) {
        set_current(None);
    }
}
