//! Entry Point Lógico do Kernel.
//!
//! `kernel_main` é o primeiro código Rust de alto nível após o trampolim
//! em assembly (`_start`).
//!
//! # Responsabilidades
//! 1. **Validação**: o handoff do bootloader é coerente?
//! 2. **Orquestração**: subsistemas na ordem estrita de dependência
//!    (Arch → Memória → Drivers → Malha de eventos → Sched).
//! 3. **Transição**: processos de demonstração criados, interrupções
//!    habilitadas, salto para Ring 3.

use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::core::handoff::{BootInfo, BOOT_INFO_VERSION, BOOT_MAGIC};
use crate::event::workflow::{self, NodeSpec};

/// Programa de usuário A: dois YIELDs cooperativos e um EXIT via
/// `kernel_notify` (int 0x80). Exercita o round-robin.
///
/// ```text
/// mov rdi, 0        ; workflow_id
/// mov rsi, 0x08     ; YIELD
/// int 0x80
/// mov rsi, 0x08     ; YIELD
/// int 0x80
/// mov rsi, 0x10     ; EXIT
/// int 0x80
/// jmp $             ; nunca alcançado
/// ```
#[rustfmt::skip]
static DEMO_YIELDER: &[u8] = &[
    0x48, 0xC7, 0xC7, 0x00, 0x00, 0x00, 0x00, // mov rdi, 0
    0x48, 0xC7, 0xC6, 0x08, 0x00, 0x00, 0x00, // mov rsi, 8 (YIELD)
    0xCD, 0x80,                               // int 0x80
    0x48, 0xC7, 0xC6, 0x08, 0x00, 0x00, 0x00, // mov rsi, 8 (YIELD)
    0xCD, 0x80,                               // int 0x80
    0x48, 0xC7, 0xC6, 0x10, 0x00, 0x00, 0x00, // mov rsi, 0x10 (EXIT)
    0xCD, 0x80,                               // int 0x80
    0xEB, 0xFE,                               // jmp $
];

/// Programa de usuário B: a tese inteira em ~80 bytes. Constrói um
/// RingEvent CRC32 direto no slot 0 do EventRing compartilhado
/// (0x2020_0000), publica o tail e chama `kernel_notify(1, SUBMIT|WAIT)`;
/// depois EXIT. Os offsets são o ABI do RingEvent (slot 0 começa em +128).
///
/// ```text
/// mov rbx, 0x20200000            ; base do EventRing
/// mov qword [rbx+0x88], 1        ; slot0.workflow_id = 1
/// mov dword [rbx+0x90], 100      ; slot0.type = CRC32
/// mov byte  [rbx+0xA0], 1        ; slot0.route[0] = Operations
/// mov dword [rbx+0xA8], 'Helm'   ; slot0.payload
/// mov dword [rbx+0x2A8], 4       ; slot0.payload_size
/// mov qword [rbx+0x40], 1        ; tail = 1 (publica o slot)
/// mov rdi, 1                     ; workflow_id
/// mov rsi, 0x03                  ; SUBMIT | WAIT
/// int 0x80
/// mov rsi, 0x10                  ; EXIT
/// int 0x80
/// jmp $
/// ```
#[rustfmt::skip]
static DEMO_SUBMITTER: &[u8] = &[
    0x48, 0xC7, 0xC3, 0x00, 0x00, 0x20, 0x20,                   // mov rbx, 0x20200000
    0x48, 0xC7, 0x83, 0x88, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x00,                                     // mov qword [rbx+0x88], 1
    0xC7, 0x83, 0x90, 0x00, 0x00, 0x00,
    0x64, 0x00, 0x00, 0x00,                                     // mov dword [rbx+0x90], 100
    0xC6, 0x83, 0xA0, 0x00, 0x00, 0x00, 0x01,                   // mov byte  [rbx+0xA0], 1
    0xC7, 0x83, 0xA8, 0x00, 0x00, 0x00,
    0x48, 0x65, 0x6C, 0x6D,                                     // mov dword [rbx+0xA8], "Helm"
    0xC7, 0x83, 0xA8, 0x02, 0x00, 0x00,
    0x04, 0x00, 0x00, 0x00,                                     // mov dword [rbx+0x2A8], 4
    0x48, 0xC7, 0x43, 0x40, 0x01, 0x00, 0x00, 0x00,             // mov qword [rbx+0x40], 1
    0x48, 0xC7, 0xC7, 0x01, 0x00, 0x00, 0x00,                   // mov rdi, 1
    0x48, 0xC7, 0xC6, 0x03, 0x00, 0x00, 0x00,                   // mov rsi, SUBMIT|WAIT
    0xCD, 0x80,                                                 // int 0x80
    0x48, 0xC7, 0xC6, 0x10, 0x00, 0x00, 0x00,                   // mov rsi, 0x10 (EXIT)
    0xCD, 0x80,                                                 // int 0x80
    0xEB, 0xFE,                                                 // jmp $
];

/// Função principal do Kernel (High-Level). Não retorna.
pub extern "C" fn kernel_main(boot_info: &'static BootInfo) -> ! {
    // [1] Serial + logging primeiro: sem isso, debugging às cegas
    crate::drivers::serial::init();

    crate::kprintln!();
    crate::kprintln!("╔════════════════════════════════════════╗");
    crate::kprintln!("║    Meridian OS (Helm) — v0.1.0         ║");
    crate::kprintln!("║    kernel orientado a workflows        ║");
    crate::kprintln!("╚════════════════════════════════════════╝");

    // [2] Sanity check do handoff
    if boot_info.magic != BOOT_MAGIC {
        crate::kfail!("Handoff inválido (magic {:#x}) — halt", boot_info.magic);
        Cpu::hang();
    }
    if boot_info.version != BOOT_INFO_VERSION {
        crate::kfail!("Protocolo de boot v{} não suportado — halt", boot_info.version);
        Cpu::hang();
    }
    crate::kok!("Handoff validado (protocolo v{})", boot_info.version);

    // [3] Arquitetura: GDT (+TSS) e IDT antes de qualquer falha possível
    // SAFETY: boot single-threaded, chamadas únicas.
    unsafe {
        crate::arch::platform::gdt::init();
        crate::arch::platform::idt::init();
    }
    crate::kok!("CPU inicializada (GDT/TSS/IDT)");

    // [4] Memória: PMM → Heap → VMM (habilita Box/Vec/String)
    // SAFETY: handoff validado, chamada única.
    unsafe {
        crate::mm::init(boot_info);
    }
    crate::kok!("Memória inicializada (PMM/Heap/VMM)");

    // [5] Controladores: PIC remapeado, só IRQ0 (timer) liberada, PIT 100Hz
    crate::drivers::pic::init();
    crate::drivers::pic::unmask(0);
    let freq = crate::drivers::timer::init(crate::drivers::timer::SYSTEM_HZ);
    crate::kok!("Drivers prontos (PIC + PIT a {} Hz)", freq);

    // [6] Colaboradores e subsistemas lógicos
    crate::fs::init();
    crate::process::init();
    crate::sched::init();
    crate::event::init();
    crate::kok!("Subsistemas lógicos prontos");

    // [7] Workflow alvo do programa de demonstração: registrado ANTES dos
    //     self-tests para garantir id=1 (o blob de usuário o referencia).
    let demo_workflow = workflow::register(
        "user_probe",
        [crate::event::deck::PREFIX_OPERATIONS, 0, 0, 0, 0, 0, 0, 0],
        &[NodeSpec::new(
            crate::event::decks::operations::OP_CRC32,
            b"Meridian boot probe",
            &[],
        )],
        0,
    );
    match demo_workflow {
        Ok(id) => crate::kinfo!("(Boot) workflow de demonstração pronto (id={})", id),
        Err(code) => crate::kwarn!("(Boot) registro do workflow falhou: {}", code.as_str()),
    }

    // [8] Self-tests: após todos os inits, antes do primeiro processo.
    //     Se algo falhar aqui, o kernel PARA — melhor que corromper user.
    #[cfg(feature = "self_test")]
    {
        crate::kinfo!("═══════════ SELF-TEST ═══════════");
        crate::sys::test::run_sys_tests();
        crate::mm::test::run_memory_tests();
        crate::sched::test::run_sched_tests();
        crate::event::test::run_event_tests();
        crate::kinfo!("═══════ SELF-TEST: TUDO OK ═══════");
    }

    // [9] Malha de eventos ativa
    crate::event::start();

    // [10] Processos de demonstração: um submitter (SUBMIT|WAIT pelo ring)
    //      e dois yielders (round-robin cooperativo)
    crate::kinfo!("(Boot) Criando processos de demonstração...");
    let programs: [&[u8]; 3] = [DEMO_SUBMITTER, DEMO_YIELDER, DEMO_YIELDER];
    for program in programs {
        match crate::process::create(program, 0) {
            Some(pid) => crate::sched::add(pid),
            None => crate::kerror!("(Boot) falha ao criar processo de demonstração"),
        }
    }

    // [11] O grande salto: interrupções ligadas, Ring 3
    crate::kok!("Habilitando interrupções — sistema ativo");
    Cpu::enable_interrupts();

    if let Some(pid) = crate::sched::take_next() {
        crate::process::enter_usermode(pid); // não retorna
    }

    // Sem processos (tudo falhou?): o timer segue bombeando a malha.
    crate::kwarn!("(Boot) Nenhum processo para executar — idle");
    loop {
        Cpu::halt();
    }
}
