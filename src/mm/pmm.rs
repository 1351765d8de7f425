//! Physical Memory Manager (PMM) — Bitmap Frame Allocator.
//!
//! Gerencia a alocação de frames físicos (4 KiB) através de um bitmap:
//! cada bit representa um frame (0 = livre, 1 = usado). O bitmap é colocado
//! no início da maior região Usable do mapa de memória.
//!
//! ### Contratos / Invariantes
//! - `init()` deve ser chamado cedo, com um `BootInfo` válido.
//! - Todos os endereços retornados são alinhados a `FRAME_SIZE`.
//! - `alloc_frames(n)` devolve frames CONTÍGUOS (o processo precisa disso
//!   para código, stack e a região dos rings).
//! - Double-free é detectado e logado, nunca corrompe o bitmap.

use crate::core::handoff::{BootInfo, MemoryKind};
use crate::sync::Spinlock;

pub const FRAME_SIZE: usize = 4096;

/// Alocador global (protegido por Spinlock).
pub static FRAME_ALLOCATOR: Spinlock<BitmapFrameAllocator> =
    Spinlock::new(BitmapFrameAllocator::empty());

/// Alocador de frames por bitmap.
pub struct BitmapFrameAllocator {
    /// Bitmap: um bit por frame (LSB primeiro). `None` antes do init.
    bitmap: Option<&'static mut [u64]>,
    /// Endereço físico do frame de índice 0.
    base: u64,
    /// Total de frames gerenciados.
    total_frames: usize,
    /// Frames atualmente em uso.
    used_frames: usize,
}

impl BitmapFrameAllocator {
    pub const fn empty() -> Self {
        Self {
            bitmap: None,
            base: 0,
            total_frames: 0,
            used_frames: 0,
        }
    }

    /// Inicializa o bitmap sobre a maior região Usable do mapa.
    ///
    /// # Safety
    /// O mapa de memória do BootInfo deve descrever RAM real e
    /// identity-mapped; o início da região é convertido em slice mutável.
    pub unsafe fn init(&mut self, boot_info: &BootInfo) {
        // 1. Escolher a maior região utilizável
        let mut best_base = 0u64;
        let mut best_len = 0u64;
        for range in boot_info.memory_ranges() {
            if range.kind == MemoryKind::Usable && range.length > best_len {
                best_base = range.base;
                best_len = range.length;
            }
        }

        if best_len < (FRAME_SIZE * 64) as u64 {
            panic!("PMM: nenhuma região utilizável de memória encontrada");
        }

        // 2. Dimensionar o bitmap e reservar seu espaço no início da região
        let total_frames = (best_len as usize) / FRAME_SIZE;
        let bitmap_words = total_frames.div_ceil(64);
        let bitmap_bytes = bitmap_words * 8;
        let bitmap_frames = bitmap_bytes.div_ceil(FRAME_SIZE);

        let bitmap = core::slice::from_raw_parts_mut(best_base as *mut u64, bitmap_words);
        bitmap.fill(0);

        self.bitmap = Some(bitmap);
        self.base = best_base;
        self.total_frames = total_frames;
        self.used_frames = 0;

        // 3. Marcar os frames do próprio bitmap como usados
        for i in 0..bitmap_frames {
            self.mark_used(i);
        }

        crate::kinfo!(
            "(PMM) {} frames gerenciados a partir de {:#x} ({} KiB de bitmap)",
            total_frames,
            best_base,
            bitmap_bytes / 1024
        );
    }

    #[inline]
    fn is_used(&self, index: usize) -> bool {
        let bitmap = self.bitmap.as_ref().unwrap();
        bitmap[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    fn mark_used(&mut self, index: usize) {
        let bitmap = self.bitmap.as_mut().unwrap();
        bitmap[index / 64] |= 1 << (index % 64);
        self.used_frames += 1;
    }

    #[inline]
    fn mark_free(&mut self, index: usize) {
        let bitmap = self.bitmap.as_mut().unwrap();
        bitmap[index / 64] &= !(1 << (index % 64));
        self.used_frames -= 1;
    }

    /// Aloca `count` frames contíguos. Retorna o endereço físico do primeiro.
    pub fn alloc_frames(&mut self, count: usize) -> Option<u64> {
        if self.bitmap.is_none() || count == 0 || count > self.total_frames {
            return None;
        }

        // First-fit: varredura linear por uma janela de `count` frames livres
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for i in 0..self.total_frames {
            if self.is_used(i) {
                run_len = 0;
                run_start = i + 1;
            } else {
                run_len += 1;
                if run_len == count {
                    for j in run_start..run_start + count {
                        self.mark_used(j);
                    }
                    return Some(self.base + (run_start * FRAME_SIZE) as u64);
                }
            }
        }

        crate::kerror!("(PMM) OOM: sem {} frames contíguos livres", count);
        None
    }

    /// Libera `count` frames a partir de `phys`.
    pub fn free_frames(&mut self, phys: u64, count: usize) {
        if self.bitmap.is_none() {
            return;
        }
        if phys < self.base || phys % FRAME_SIZE as u64 != 0 {
            crate::kwarn!("(PMM) free de endereço inválido: {:#x}", phys);
            return;
        }

        let start = ((phys - self.base) as usize) / FRAME_SIZE;
        if start + count > self.total_frames {
            crate::kwarn!("(PMM) free fora da região gerenciada: {:#x}", phys);
            return;
        }

        for i in start..start + count {
            if !self.is_used(i) {
                crate::kwarn!(
                    "(PMM) double-free detectado no frame {:#x}",
                    self.base + (i * FRAME_SIZE) as u64
                );
                continue;
            }
            self.mark_free(i);
        }
    }

    /// (frames usados, frames totais)
    pub fn usage(&self) -> (usize, usize) {
        (self.used_frames, self.total_frames)
    }

    /// O frame está dentro da região gerenciada e alocado?
    pub fn is_allocated(&self, phys: u64) -> bool {
        if self.bitmap.is_none() || phys < self.base || phys % FRAME_SIZE as u64 != 0 {
            return false;
        }
        let index = ((phys - self.base) as usize) / FRAME_SIZE;
        index < self.total_frames && self.is_used(index)
    }
}

/// Inicializa o alocador global.
///
/// # Safety
/// Ver `BitmapFrameAllocator::init`.
pub unsafe fn init(boot_info: &BootInfo) {
    FRAME_ALLOCATOR.lock().init(boot_info);
}

/// Aloca `count` frames contíguos (atalho com lock).
pub fn alloc_frames(count: usize) -> Option<u64> {
    FRAME_ALLOCATOR.lock().alloc_frames(count)
}

/// Libera frames (atalho com lock).
pub fn free_frames(phys: u64, count: usize) {
    FRAME_ALLOCATOR.lock().free_frames(phys, count)
}

/// Bytes → frames (arredonda para cima).
pub fn frames_for(bytes: usize) -> usize {
    bytes.div_ceil(FRAME_SIZE)
}
