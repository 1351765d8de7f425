//! Interrupt Descriptor Table (IDT).
//!
//! Mapa de vetores do Helm:
//! - 0..32   → exceções da CPU
//! - 32..48  → IRQs do PIC (32 = Timer/PIT)
//! - 0x80    → syscall `kernel_notify` (gate com DPL=3, chamável do Ring 3)
//! - 0x81    → completion signal (DPL=0, somente kernel)

use core::arch::asm;
use core::mem::size_of;

use super::interrupts;

pub const IDT_ENTRIES: usize = 256;

// Vetores reservados
pub const TIMER_VECTOR: u8 = 32;
pub const SYSCALL_VECTOR: u8 = 0x80;
pub const COMPLETION_VECTOR: u8 = 0x81;

// Exceções com tratamento dedicado
pub const EXCEPTION_DIVIDE_ERROR: u8 = 0;
pub const EXCEPTION_INVALID_OPCODE: u8 = 6;
pub const EXCEPTION_DOUBLE_FAULT: u8 = 8;
pub const EXCEPTION_GENERAL_PROTECTION: u8 = 13;
pub const EXCEPTION_PAGE_FAULT: u8 = 14;

// type_attr: Present | tipo interrupt gate (0xE), com DPL embutido
const GATE_KERNEL: u8 = 0x8E;
const GATE_USER: u8 = 0xEE;

/// Frame construído pelos stubs de interrupção (ver `interrupts.rs`).
///
/// Layout em memória a partir de RSP no momento do `call` para o handler:
/// GPRs salvos pelo stub, código de erro (real ou fake 0) e o frame de
/// hardware que o `iretq` consome (RIP/CS/RFLAGS/RSP/SS).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ContextFrame {
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
    pub rbp: u64,
    pub error_code: u64,
    // Frame de hardware (consumido pelo IRETQ)
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl ContextFrame {
    /// O frame veio do Ring 3? (RPL do seletor de código)
    #[inline]
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }
}

/// Entrada da IDT (Gate Descriptor de 16 bytes).
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn new(handler: u64, type_attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: super::gdt::KERNEL_CODE,
            ist: 0,
            type_attr,
            offset_mid: ((handler >> 16) & 0xFFFF) as u16,
            offset_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }
}

#[repr(C, align(16))]
struct Idt {
    entries: [IdtEntry; IDT_ENTRIES],
}

static mut IDT: Idt = Idt {
    entries: [IdtEntry::missing(); IDT_ENTRIES],
};

#[repr(C, packed)]
struct IdtDescriptor {
    limit: u16,
    base: u64,
}

fn set_gate(vector: u8, handler: unsafe extern "C" fn(), type_attr: u8) {
    // SAFETY: escrita single-threaded durante o boot, antes do STI.
    unsafe {
        let idt = core::ptr::addr_of_mut!(IDT);
        (*idt).entries[vector as usize] = IdtEntry::new(handler as u64, type_attr);
    }
}

/// Configura e carrega a IDT.
///
/// # Safety
/// Deve ser chamado uma única vez no boot, com a GDT já carregada.
pub unsafe fn init() {
    crate::kinfo!("(IDT) Configurando vetores de interrupção...");

    // Exceções dedicadas
    set_gate(EXCEPTION_DIVIDE_ERROR, interrupts::stub_divide_error, GATE_KERNEL);
    set_gate(EXCEPTION_INVALID_OPCODE, interrupts::stub_invalid_opcode, GATE_KERNEL);
    set_gate(EXCEPTION_DOUBLE_FAULT, interrupts::stub_double_fault, GATE_KERNEL);
    set_gate(
        EXCEPTION_GENERAL_PROTECTION,
        interrupts::stub_general_protection,
        GATE_KERNEL,
    );
    set_gate(EXCEPTION_PAGE_FAULT, interrupts::stub_page_fault, GATE_KERNEL);

    // Demais exceções caem no handler genérico. Vetores que empilham
    // error code (TS/NP/SS/AC) precisam do stub que o desempilha.
    for vector in 0..32u8 {
        if matches!(
            vector,
            EXCEPTION_DIVIDE_ERROR
                | EXCEPTION_INVALID_OPCODE
                | EXCEPTION_DOUBLE_FAULT
                | EXCEPTION_GENERAL_PROTECTION
                | EXCEPTION_PAGE_FAULT
        ) {
            continue;
        }
        let stub: unsafe extern "C" fn() = if matches!(vector, 10 | 11 | 12 | 17) {
            interrupts::stub_unknown_exception_err
        } else {
            interrupts::stub_unknown_exception
        };
        set_gate(vector, stub, GATE_KERNEL);
    }

    // IRQs do PIC (32..48). Só o timer tem trabalho real; o resto é dreno.
    set_gate(TIMER_VECTOR, interrupts::stub_timer_irq, GATE_KERNEL);
    for vector in 33..48u8 {
        set_gate(vector, interrupts::stub_spurious_irq, GATE_KERNEL);
    }

    // Syscall: chamável do Ring 3
    set_gate(SYSCALL_VECTOR, interrupts::stub_syscall, GATE_USER);

    // Completion signal: somente kernel
    set_gate(COMPLETION_VECTOR, interrupts::stub_completion, GATE_KERNEL);

    // Vetores restantes: dreno silencioso (um INT desconhecido não derruba
    // o kernel, apenas loga)
    for vector in 48..=255u8 {
        if vector == SYSCALL_VECTOR || vector == COMPLETION_VECTOR {
            continue;
        }
        set_gate(vector, interrupts::stub_spurious_irq, GATE_KERNEL);
    }

    load();

    crate::kinfo!(
        "(IDT) {} vetores carregados (syscall=0x80 DPL3, completion=0x81 DPL0)",
        IDT_ENTRIES
    );
}

fn load() {
    // SAFETY: IDT é estática e permanece válida para sempre.
    unsafe {
        let descriptor = IdtDescriptor {
            limit: (size_of::<Idt>() - 1) as u16,
            base: core::ptr::addr_of!(IDT) as u64,
        };
        asm!("lidt [{}]", in(reg) &descriptor, options(nostack));
    }
}
