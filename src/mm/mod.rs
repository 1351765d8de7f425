//! Gerenciamento de Memória (PMM, Heap, VMM).
//!
//! O core de workflows consome estes três colaboradores:
//! - `pmm` — alocador de frames físicos (bitmap, 4 KiB).
//! - `heap` — alocador global do kernel (`Box`/`Vec`/`String`).
//! - `vmm` — page tables por processo e disciplina de CR3.

pub mod heap;
pub mod pmm;
pub mod test;
pub mod vmm;

use crate::core::handoff::BootInfo;

/// Inicializa o subsistema de memória na ordem de dependência.
///
/// # Safety
/// Deve ser chamado uma única vez no boot, antes de qualquer alocação.
pub unsafe fn init(boot_info: &BootInfo) {
    pmm::init(boot_info);
    heap::init();
    vmm::init();
}
