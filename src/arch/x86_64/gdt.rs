//! Global Descriptor Table (GDT) + TSS.
//!
//! Mesmo em 64-bit (Long Mode), a GDT é necessária para:
//! 1. Definir segmentos de Código/Dados (Kernel vs User, DPL 0 vs 3).
//! 2. Carregar o TSS (Task State Segment) — a CPU lê `rsp0` dele em toda
//!    transição Ring 3 → Ring 0 (syscall via int, IRQ em modo usuário).

use core::arch::asm;
use core::mem::size_of;
use core::ptr::addr_of;

// Seletores (índice << 3 | RPL). Os seletores de usuário carregam RPL=3.
pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;
pub const USER_CODE: u16 = 0x18 | 3;
pub const USER_DATA: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

/// Topo da stack de kernel usada em transições de privilégio (TSS.rsp0).
/// Endereço fixo na região identity-mapped baixa.
pub const KERNEL_INTERRUPT_STACK_TOP: u64 = 0x0090_0000;

/// Estrutura de entrada da GDT (64-bit friendly).
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    /// Cria uma entrada nula (obrigatória).
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    /// Cria um segmento de código/dados padrão para 64-bit.
    const fn new(access: u8, flags: u8) -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access,
            granularity: flags, // Em 64-bit, limites são ignorados
            base_high: 0,
        }
    }
}

// Flags de Acesso
const ACCESS_PRESENT: u8 = 0x80;
const ACCESS_DESCRIPTOR: u8 = 0x10; // 1 = Código/Dados, 0 = Sistema
const ACCESS_EXECUTABLE: u8 = 0x08;
const ACCESS_RW: u8 = 0x02;
const ACCESS_PRIV_KERNEL: u8 = 0x00;
const ACCESS_PRIV_USER: u8 = 0x60;
const ACCESS_TSS_AVAILABLE: u8 = 0x89; // Sistema, 64-bit TSS disponível

// Flags de Granularidade
const FLAG_LONG_MODE: u8 = 0x20;

/// Task State Segment (64-bit).
#[repr(C, packed)]
struct Tss {
    _reserved0: u32,
    rsp0: u64,
    rsp1: u64,
    rsp2: u64,
    _reserved1: u64,
    ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    iomap_base: u16,
}

static mut TSS: Tss = Tss {
    _reserved0: 0,
    rsp0: KERNEL_INTERRUPT_STACK_TOP,
    rsp1: 0,
    rsp2: 0,
    _reserved1: 0,
    ist: [0; 7],
    _reserved2: 0,
    _reserved3: 0,
    iomap_base: size_of::<Tss>() as u16, // Sem IO bitmap
};

#[repr(C, align(4096))]
struct Gdt {
    null: GdtEntry,
    kernel_code: GdtEntry,
    kernel_data: GdtEntry,
    user_code: GdtEntry,
    user_data: GdtEntry,
    // Descritor de TSS ocupa 16 bytes em Long Mode (duas entradas).
    tss_low: GdtEntry,
    tss_high: GdtEntry,
}

static mut GDT: Gdt = Gdt {
    null: GdtEntry::null(),
    // Offset 0x08: Kernel Code
    kernel_code: GdtEntry::new(
        ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_EXECUTABLE | ACCESS_RW | ACCESS_PRIV_KERNEL,
        FLAG_LONG_MODE,
    ),
    // Offset 0x10: Kernel Data
    kernel_data: GdtEntry::new(
        ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_RW | ACCESS_PRIV_KERNEL,
        0,
    ),
    // Offset 0x18: User Code
    user_code: GdtEntry::new(
        ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_EXECUTABLE | ACCESS_RW | ACCESS_PRIV_USER,
        FLAG_LONG_MODE,
    ),
    // Offset 0x20: User Data
    user_data: GdtEntry::new(
        ACCESS_PRESENT | ACCESS_DESCRIPTOR | ACCESS_RW | ACCESS_PRIV_USER,
        0,
    ),
    // Offset 0x28: TSS (preenchido em init, base só é conhecida em runtime)
    tss_low: GdtEntry::null(),
    tss_high: GdtEntry::null(),
};

#[repr(C, packed)]
struct GdtDescriptor {
    limit: u16,
    base: u64,
}

/// Atualiza o ponteiro de stack de kernel usado em transições de privilégio.
/// Chamado pelo scheduler/process antes de retornar ao Ring 3.
pub fn tss_set_rsp0(rsp0: u64) {
    // SAFETY: escrita única de 8 bytes; campo packed exige write_unaligned.
    unsafe {
        let tss = core::ptr::addr_of_mut!(TSS);
        core::ptr::addr_of_mut!((*tss).rsp0).write_unaligned(rsp0);
    }
}

/// Carrega a GDT, recarrega os registradores de segmento e o TR.
///
/// # Safety
/// Mexe com estado global da CPU. Deve ser chamado apenas uma vez no boot.
pub unsafe fn init() {
    // 1. Preencher o descritor do TSS (base em runtime)
    let tss_base = addr_of!(TSS) as u64;
    let tss_limit = (size_of::<Tss>() - 1) as u16;

    let gdt = core::ptr::addr_of_mut!(GDT);
    (*gdt).tss_low = GdtEntry {
        limit_low: tss_limit,
        base_low: (tss_base & 0xFFFF) as u16,
        base_mid: ((tss_base >> 16) & 0xFF) as u8,
        access: ACCESS_TSS_AVAILABLE,
        granularity: 0,
        base_high: ((tss_base >> 24) & 0xFF) as u8,
    };
    // Parte alta do descritor de 16 bytes: bits 32..63 da base.
    let high = (tss_base >> 32) as u32;
    (*gdt).tss_high = GdtEntry {
        limit_low: (high & 0xFFFF) as u16,
        base_low: ((high >> 16) & 0xFFFF) as u16,
        base_mid: 0,
        access: 0,
        granularity: 0,
        base_high: 0,
    };

    // 2. Carregar a GDT
    let descriptor = GdtDescriptor {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: gdt as u64,
    };
    asm!("lgdt [{}]", in(reg) &descriptor, options(nostack));

    // 3. Recarregar CS via far-return e os demais segmentos por MOV
    asm!(
        "push {kcode}",
        "lea rax, [rip + 2f]",
        "push rax",
        "retfq",
        "2:",
        "mov ax, {kdata:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        kcode = const KERNEL_CODE as u64,
        kdata = in(reg) KERNEL_DATA,
        out("rax") _,
    );

    // 4. Carregar o Task Register
    asm!("ltr {:x}", in(reg) TSS_SELECTOR, options(nostack));
}
