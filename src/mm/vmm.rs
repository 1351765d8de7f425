//! Virtual Memory Manager (VMM).
//!
//! Gerencia as page tables (PML4, 4 níveis) e o mapeamento Virtual → Físico.
//! Cada processo possui um `AddressSpace` isolado que compartilha os
//! mapeamentos do kernel (cópia das entradas da PML4 de boot).
//!
//! ### Disciplina de CR3 (ver também `process::destroy`)
//! - Nunca trocar CR3 segurando um endereço que só exista no contexto velho.
//! - Nunca destruir um `AddressSpace` enquanto ele for o contexto ativo —
//!   o `Drop` troca para o contexto do kernel antes de liberar, por defesa.

use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::mm::pmm::{self, FRAME_SIZE};

bitflags! {
    /// Flags de entrada de page table (x86-64).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE = 1 << 4;
        const HUGE = 1 << 7;
    }
}

impl PageFlags {
    /// Kernel leitura/escrita.
    pub const KERNEL_RW: PageFlags = PageFlags::PRESENT.union(PageFlags::WRITABLE);
    /// Código de usuário (leitura/execução).
    pub const USER_CODE: PageFlags = PageFlags::PRESENT.union(PageFlags::USER);
    /// Dados de usuário (leitura/escrita).
    pub const USER_RW: PageFlags = PageFlags::PRESENT
        .union(PageFlags::USER)
        .union(PageFlags::WRITABLE);
}

const ENTRY_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;
const ENTRIES_PER_TABLE: usize = 512;

/// PML4 do kernel, capturada do CR3 deixado pelo bootloader.
static KERNEL_PML4: AtomicU64 = AtomicU64::new(0);

/// Falhas possíveis de mapeamento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// Sem frames para tabelas intermediárias.
    OutOfMemory,
    /// Endereço não alinhado a página.
    Misaligned,
}

/// Inicializa o VMM capturando o contexto de paginação do boot.
///
/// # Safety
/// Assume que o bootloader configurou paginação com a região baixa
/// identity-mapped (kernel, bitmap do PMM, heap, rings).
pub unsafe fn init() {
    let cr3 = Cpu::read_cr3();
    KERNEL_PML4.store(cr3, Ordering::Relaxed);
    crate::kinfo!("(VMM) Contexto do kernel capturado (PML4 em {:#x})", cr3);
}

/// Raiz de page table do kernel.
pub fn kernel_pml4() -> u64 {
    KERNEL_PML4.load(Ordering::Relaxed)
}

/// Troca a CPU para o contexto de paginação do kernel.
pub fn switch_to_kernel() {
    // SAFETY: a PML4 do kernel mapeia todo o código/dados do kernel.
    unsafe {
        Cpu::write_cr3(kernel_pml4());
    }
}

/// Hook de resolução de page fault.
///
/// Sem demand paging neste kernel: nenhuma falha é resolvível. O hook
/// existe como contrato para o trap plumbing (e futuros colaboradores).
pub fn handle_page_fault(fault_addr: u64, error_code: u64) -> bool {
    crate::ktrace!(
        "(VMM) page fault não resolvível: addr={:#x} err={:#x}",
        fault_addr,
        error_code
    );
    false
}

/// Visão de uma page table física como slice de entradas.
///
/// # Safety
/// `phys` deve ser um frame de tabela válido e identity-mapped.
unsafe fn table_mut(phys: u64) -> &'static mut [u64] {
    core::slice::from_raw_parts_mut(phys as *mut u64, ENTRIES_PER_TABLE)
}

/// Espaço de endereçamento por processo.
///
/// Possui a árvore de page tables (a PML4 e toda tabela intermediária
/// alocada) e os frames de usuário "adotados" — tudo é liberado exatamente
/// uma vez no `Drop`.
pub struct AddressSpace {
    pml4_phys: u64,
    /// Frames das tabelas (inclui a própria PML4).
    table_frames: Vec<u64>,
    /// Frames de usuário a liberar no teardown: (phys, quantidade).
    owned_frames: Vec<(u64, usize)>,
}

impl AddressSpace {
    /// Cria um novo espaço compartilhando os mapeamentos do kernel.
    pub fn new() -> Option<Self> {
        let pml4_phys = pmm::alloc_frames(1)?;

        // SAFETY: frame recém-alocado e identity-mapped.
        unsafe {
            let new_pml4 = table_mut(pml4_phys);
            let kernel = table_mut(kernel_pml4());
            // Herdar TODOS os mapeamentos do kernel (identity baixa + higher
            // half). As entradas de usuário serão criadas por cima.
            new_pml4.copy_from_slice(kernel);
        }

        let mut table_frames = Vec::new();
        table_frames.push(pml4_phys);

        Some(Self {
            pml4_phys,
            table_frames,
            owned_frames: Vec::new(),
        })
    }

    /// Raiz física deste espaço (valor para CR3).
    #[inline]
    pub fn pml4_phys(&self) -> u64 {
        self.pml4_phys
    }

    /// Registra frames de usuário para liberação no teardown.
    pub fn adopt_frames(&mut self, phys: u64, count: usize) {
        self.owned_frames.push((phys, count));
    }

    /// Obtém (ou cria) a tabela apontada por `entry`.
    fn next_table(&mut self, table_phys: u64, index: usize) -> Option<u64> {
        // SAFETY: tabelas desta árvore são frames válidos identity-mapped.
        let table = unsafe { table_mut(table_phys) };
        let entry = table[index];

        if entry & PageFlags::PRESENT.bits() != 0 {
            return Some(entry & ENTRY_ADDR_MASK);
        }

        let frame = pmm::alloc_frames(1)?;
        // SAFETY: frame novo, exclusivo desta árvore.
        unsafe {
            table_mut(frame).fill(0);
        }
        // Entradas intermediárias permissivas; a proteção real fica na folha.
        table[index] =
            frame | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
        self.table_frames.push(frame);
        Some(frame)
    }

    /// Mapeia `count` páginas contíguas de `phys` em `virt`.
    pub fn map_pages(
        &mut self,
        virt: u64,
        phys: u64,
        count: usize,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        if virt % FRAME_SIZE as u64 != 0 || phys % FRAME_SIZE as u64 != 0 {
            return Err(MapError::Misaligned);
        }

        for i in 0..count {
            let v = virt + (i * FRAME_SIZE) as u64;
            let p = phys + (i * FRAME_SIZE) as u64;

            let pml4_idx = ((v >> 39) & 0x1FF) as usize;
            let pdpt_idx = ((v >> 30) & 0x1FF) as usize;
            let pd_idx = ((v >> 21) & 0x1FF) as usize;
            let pt_idx = ((v >> 12) & 0x1FF) as usize;

            let pdpt = self
                .next_table(self.pml4_phys, pml4_idx)
                .ok_or(MapError::OutOfMemory)?;
            let pd = self.next_table(pdpt, pdpt_idx).ok_or(MapError::OutOfMemory)?;
            let pt = self.next_table(pd, pd_idx).ok_or(MapError::OutOfMemory)?;

            // SAFETY: `pt` é uma tabela folha desta árvore.
            unsafe {
                table_mut(pt)[pt_idx] = p | flags.bits();
            }
        }
        Ok(())
    }

    /// Remove o mapeamento de `count` páginas a partir de `virt`.
    /// Não libera os frames físicos (quem libera é o dono — ver `Drop`).
    pub fn unmap_pages(&mut self, virt: u64, count: usize) {
        for i in 0..count {
            let v = virt + (i * FRAME_SIZE) as u64;

            let pml4_idx = ((v >> 39) & 0x1FF) as usize;
            let pdpt_idx = ((v >> 30) & 0x1FF) as usize;
            let pd_idx = ((v >> 21) & 0x1FF) as usize;
            let pt_idx = ((v >> 12) & 0x1FF) as usize;

            // Caminhar sem criar tabelas novas
            // SAFETY: tabelas da árvore são identity-mapped.
            unsafe {
                let pml4 = table_mut(self.pml4_phys);
                let e = pml4[pml4_idx];
                if e & PageFlags::PRESENT.bits() == 0 {
                    continue;
                }
                let pdpt = table_mut(e & ENTRY_ADDR_MASK);
                let e = pdpt[pdpt_idx];
                if e & PageFlags::PRESENT.bits() == 0 {
                    continue;
                }
                let pd = table_mut(e & ENTRY_ADDR_MASK);
                let e = pd[pd_idx];
                if e & PageFlags::PRESENT.bits() == 0 {
                    continue;
                }
                let pt = table_mut(e & ENTRY_ADDR_MASK);
                pt[pt_idx] = 0;
            }
        }
    }

    /// Resolve um endereço virtual para físico neste espaço (debug/testes).
    pub fn translate(&self, virt: u64) -> Option<u64> {
        let pml4_idx = ((virt >> 39) & 0x1FF) as usize;
        let pdpt_idx = ((virt >> 30) & 0x1FF) as usize;
        let pd_idx = ((virt >> 21) & 0x1FF) as usize;
        let pt_idx = ((virt >> 12) & 0x1FF) as usize;

        // SAFETY: leitura das tabelas da árvore.
        unsafe {
            let mut table = self.pml4_phys;
            for idx in [pml4_idx, pdpt_idx, pd_idx] {
                let e = table_mut(table)[idx];
                if e & PageFlags::PRESENT.bits() == 0 {
                    return None;
                }
                table = e & ENTRY_ADDR_MASK;
            }
            let e = table_mut(table)[pt_idx];
            if e & PageFlags::PRESENT.bits() == 0 {
                return None;
            }
            Some((e & ENTRY_ADDR_MASK) | (virt & 0xFFF))
        }
    }

    /// Ativa este espaço na CPU.
    ///
    /// # Safety
    /// O espaço deve mapear o código de kernel em execução (garantido pela
    /// herança da PML4 do kernel em `new`).
    pub unsafe fn switch(&self) {
        Cpu::write_cr3(self.pml4_phys);
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        // Defesa: nunca liberar a árvore que a CPU está usando.
        if Cpu::read_cr3() == self.pml4_phys {
            switch_to_kernel();
        }

        for &(phys, count) in &self.owned_frames {
            pmm::free_frames(phys, count);
        }
        for &frame in &self.table_frames {
            pmm::free_frames(frame, 1);
        }
    }
}
