//! Kernel Helm — Binário Principal.
//!
//! Responsabilidade:
//! 1. Configurar o ambiente de execução "naked" (Assembly).
//! 2. Inicializar a Stack do kernel.
//! 3. Saltar para `core::entry::kernel_main` (da biblioteca `helm`).

#![no_std]
#![no_main]

use core::arch::naked_asm;

// Importar a biblioteca do kernel.
use helm::core as kernel_core;

extern crate alloc;

// Stack do kernel (64 KB).
#[repr(align(16))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

const KERNEL_STACK_SIZE: usize = 64 * 1024;

#[no_mangle]
static KERNEL_STACK: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

/// Ponto de entrada Naked.
/// Configura o Stack Pointer (RSP) antes de chamar o código Rust.
/// O bootloader entrega o endereço do BootInfo em RDI (System V).
#[unsafe(naked)]
#[no_mangle]
#[link_section = ".text._start"]
pub unsafe extern "C" fn _start(boot_info_addr: u64) -> ! {
    naked_asm!(
        // 1. Salvar argumento (boot_info) em R15 (callee-saved)
        "mov r15, rdi",

        // 2. Configurar Stack Pointer (RSP)
        "lea rax, [rip + {stack}]",
        "lea rsp, [rax + {stack_size}]",

        // 3. Zerar RBP (Frame Pointer) e alinhar a stack
        "xor rbp, rbp",
        "and rsp, -16",

        // 4. Restaurar argumento e chamar kernel_main
        "mov rdi, r15",
        "call {kernel_main}",

        // 5. Trap (halt loop robusto — kernel_main não retorna)
        "2:",
        "cli",
        "hlt",
        "jmp 2b",

        stack = sym KERNEL_STACK,
        stack_size = const KERNEL_STACK_SIZE,
        kernel_main = sym kernel_core::entry::kernel_main,
    );
}
