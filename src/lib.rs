//! Helm Kernel Library.
//!
//! Ponto central de exportação dos módulos do Kernel.
//! O Helm é um kernel orientado a workflows: processos de usuário não chamam
//! dezenas de syscalls estreitas — eles submetem DAGs de eventos tipados via
//! ring buffers compartilhados e um único ponto de entrada (`kernel_notify`).

#![no_std]

// Habilitar alocação dinâmica (necessário para Vec/Box/String)
extern crate alloc;

// --- Módulos de Baixo Nível (Hardware) ---
pub mod arch; // HAL (CPU, GDT, IDT, stubs de interrupção)
pub mod drivers; // Drivers específicos (Serial, PIC, PIT)

// --- Módulos Centrais (Lógica do Kernel) ---
pub mod core; // Inicialização, Logging, Panic, Handoff
pub mod klib; // Utilitários internos (framework de self-test)
pub mod mm; // Gerenciamento de Memória (PMM, VMM, Heap)
pub mod sync; // Primitivas de Sincronização (Spinlock)
pub mod sys; // Definições de Sistema (códigos de erro)

// --- Subsistemas ---
pub mod event; // Malha de eventos: rings, routing, guide, decks, workflows
pub mod fs; // Tag-store (colaborador do Storage Deck)
pub mod process; // Processos e espaços de endereçamento
pub mod sched; // Scheduler híbrido (cooperativo + preemptivo)
pub mod syscall; // kernel_notify + completion signal

// Re-exportar BootInfo para acesso fácil no binário
pub use crate::core::handoff::BootInfo;
