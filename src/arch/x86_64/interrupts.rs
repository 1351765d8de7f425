//! Stubs de Interrupção em Assembly + isolamento de falhas.
//!
//! Os stubs `#[unsafe(naked)]` salvam todos os GPRs, entregam um ponteiro de
//! `ContextFrame` ao handler Rust em RDI e restauram tudo antes do `iretq`.
//!
//! Política de falhas (trap plumbing):
//! - Falha em modo usuário → processo vira Zombie e cede a CPU; o kernel
//!   sobrevive e os demais processos continuam.
//! - Falha em modo kernel → fatal: loga e congela o sistema.

use core::arch::naked_asm;

use super::idt::ContextFrame;
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;

// Macro para criar stubs de exceção SEM código de erro (push 0 manual)
macro_rules! handler_no_err {
    ($name:ident, $handler_fn:ident) => {
        #[unsafe(naked)]
        pub unsafe extern "C" fn $name() {
            naked_asm!(
                "push 0",       // Fake error code para alinhar o frame
                "push rbp",
                "push r15", "push r14", "push r13", "push r12",
                "push r11", "push r10", "push r9",  "push r8",
                "push rdi", "push rsi", "push rdx", "push rcx", "push rbx", "push rax",

                "mov rdi, rsp", // Arg 1 (frame): ponteiro para a stack atual
                "call {handler}",

                "pop rax", "pop rbx", "pop rcx", "pop rdx", "pop rsi", "pop rdi",
                "pop r8",  "pop r9",  "pop r10", "pop r11",
                "pop r12", "pop r13", "pop r14", "pop r15",
                "pop rbp",
                "add rsp, 8",   // Remover fake error code
                "iretq",
                handler = sym $handler_fn,
            );
        }
    };
}

// Macro para exceções que JÁ empilham erro (ex: Page Fault, #GP, #DF)
macro_rules! handler_with_err {
    ($name:ident, $handler_fn:ident) => {
        #[unsafe(naked)]
        pub unsafe extern "C" fn $name() {
            naked_asm!(
                // Error code já está na stack (empilhado pela CPU)
                "push rbp",
                "push r15", "push r14", "push r13", "push r12",
                "push r11", "push r10", "push r9",  "push r8",
                "push rdi", "push rsi", "push rdx", "push rcx", "push rbx", "push rax",

                "mov rdi, rsp",
                "call {handler}",

                "pop rax", "pop rbx", "pop rcx", "pop rdx", "pop rsi", "pop rdi",
                "pop r8",  "pop r9",  "pop r10", "pop r11",
                "pop r12", "pop r13", "pop r14", "pop r15",
                "pop rbp",
                "add rsp, 8",   // Remover error code real
                "iretq",
                handler = sym $handler_fn,
            );
        }
    };
}

handler_no_err!(stub_divide_error, divide_error_impl);
handler_no_err!(stub_invalid_opcode, invalid_opcode_impl);
handler_with_err!(stub_double_fault, double_fault_impl);
handler_with_err!(stub_general_protection, general_protection_impl);
handler_with_err!(stub_page_fault, page_fault_impl);
handler_no_err!(stub_unknown_exception, unknown_exception_impl);
handler_with_err!(stub_unknown_exception_err, unknown_exception_impl);
handler_no_err!(stub_timer_irq, timer_irq_impl);
handler_no_err!(stub_spurious_irq, spurious_irq_impl);
handler_no_err!(stub_syscall, syscall_impl);
handler_no_err!(stub_completion, completion_impl);

// ---------------------------------------------------------------------------
// Isolamento de falhas
// ---------------------------------------------------------------------------

/// Caminho comum de falha: contém o estrago em modo usuário, congela em
/// modo kernel.
fn handle_fault(frame: &mut ContextFrame, what: &str) {
    if frame.from_user() {
        crate::kerror!(
            "(Trap) {} em modo usuário: RIP={:#x} — matando processo",
            what,
            frame.rip
        );
        crate::process::kill_current();
        // Cede a CPU: o scheduler escolhe outro processo (ou entra em idle)
        // e regrava o frame. O iretq do stub já retorna para o próximo.
        crate::sched::yield_now(frame);
        return;
    }

    crate::kerror!("(Trap) {} em modo KERNEL: RIP={:#x}", what, frame.rip);
    crate::kerror!("(Trap) err={:#x} RSP={:#x} RFLAGS={:#x}", frame.error_code, frame.rsp, frame.rflags);
    panic!("Exceção fatal em modo kernel");
}

extern "C" fn divide_error_impl(frame: &mut ContextFrame) {
    handle_fault(frame, "DIVIDE ERROR");
}

extern "C" fn invalid_opcode_impl(frame: &mut ContextFrame) {
    handle_fault(frame, "INVALID OPCODE");
}

extern "C" fn double_fault_impl(frame: &mut ContextFrame) {
    // Double fault nunca é recuperável, nem vindo do Ring 3 com o estado
    // de kernel possivelmente corrompido.
    crate::kerror!("(Trap) DOUBLE FAULT: RIP={:#x}", frame.rip);
    panic!("Double fault — sistema instável");
}

extern "C" fn general_protection_impl(frame: &mut ContextFrame) {
    handle_fault(frame, "GENERAL PROTECTION FAULT");
}

extern "C" fn page_fault_impl(frame: &mut ContextFrame) {
    let fault_addr = Cpu::read_cr2();

    // Primeiro o VMM tenta resolver (contrato do colaborador; sem demand
    // paging a resposta é sempre "não resolvido").
    if crate::mm::vmm::handle_page_fault(fault_addr, frame.error_code) {
        return;
    }

    if frame.from_user() {
        crate::kerror!(
            "(Trap) PAGE FAULT de usuário: addr={:#x} err={:#x} RIP={:#x}",
            fault_addr,
            frame.error_code,
            frame.rip
        );
        crate::process::kill_current();
        crate::sched::yield_now(frame);
        return;
    }

    crate::kerror!(
        "(Trap) PAGE FAULT de kernel: addr={:#x} err={:#x} RIP={:#x}",
        fault_addr,
        frame.error_code,
        frame.rip
    );
    panic!("Page fault não tratada em modo kernel");
}

extern "C" fn unknown_exception_impl(frame: &mut ContextFrame) {
    handle_fault(frame, "EXCEÇÃO DESCONHECIDA");
}

// ---------------------------------------------------------------------------
// IRQs e software interrupts
// ---------------------------------------------------------------------------

extern "C" fn timer_irq_impl(frame: &mut ContextFrame) {
    // EOI ANTES do tick: os caminhos de idle dentro do scheduler fazem HLT
    // esperando o próximo timer — com o EOI pendente ele nunca chegaria.
    crate::drivers::pic::send_eoi(0);
    crate::drivers::timer::on_tick(frame);
}

extern "C" fn spurious_irq_impl(_frame: &mut ContextFrame) {
    // IRQ inesperada: dreno silencioso (PIC mascara tudo menos o timer).
    crate::drivers::pic::send_eoi(7);
}

extern "C" fn syscall_impl(frame: &mut ContextFrame) {
    crate::syscall::kernel_notify(frame);
}

extern "C" fn completion_impl(frame: &mut ContextFrame) {
    crate::syscall::completion_signal(frame);
}
