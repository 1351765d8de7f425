//! Kernel Heap Allocator (free list).
//!
//! Implementa `GlobalAlloc` com uma free list first-fit protegida por
//! Spinlock. Diferente de um bump allocator, RECICLA memória — o kernel de
//! workflows aloca e libera routing entries, workflows e resultados o tempo
//! todo, então `dealloc` precisa devolver blocos de verdade.
//!
//! ### Contratos importantes
//! - `init()` DEVE ser chamado exatamente uma vez, depois do PMM e antes da
//!   primeira alocação dinâmica.
//! - A região do heap vem do PMM e é identity-mapped (virt == phys na
//!   região baixa do kernel), então não depende do VMM.
//! - Blocos têm granularidade mínima de 16 bytes e a free list é mantida
//!   ordenada por endereço, com coalescência nos dois vizinhos.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use crate::mm::pmm;
use crate::sync::Spinlock;

/// Tamanho do heap do kernel (4 MiB).
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Granularidade mínima de bloco (cabe um `FreeNode` e mantém alinhamento).
const MIN_BLOCK: usize = 16;

// Global allocator exposto ao resto do kernel (Box/Vec/String).
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Cabeçalho de um bloco livre na lista encadeada.
struct FreeNode {
    size: usize,
    next: Option<NonNull<FreeNode>>,
}

/// Free list first-fit, ordenada por endereço.
pub struct FreeListAllocator {
    head: Option<NonNull<FreeNode>>,
    heap_start: usize,
    heap_size: usize,
    allocated_bytes: usize,
}

// SAFETY: protegido pelo Spinlock do LockedHeap.
unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    const fn new() -> Self {
        Self {
            head: None,
            heap_start: 0,
            heap_size: 0,
            allocated_bytes: 0,
        }
    }

    /// Entrega uma região contígua ao alocador.
    ///
    /// # Safety
    /// A região deve ser memória válida, exclusiva e identity-mapped.
    unsafe fn add_region(&mut self, start: usize, size: usize) {
        self.heap_start = start;
        self.heap_size = size;

        let node = start as *mut FreeNode;
        node.write(FreeNode { size, next: None });
        self.head = NonNull::new(node);
    }

    /// Normaliza um Layout para a granularidade do heap.
    fn effective_size(layout: Layout) -> (usize, usize) {
        let align = layout.align().max(MIN_BLOCK);
        let size = layout.size().max(MIN_BLOCK).next_multiple_of(MIN_BLOCK);
        (size, align)
    }

    fn alloc(&mut self, layout: Layout) -> *mut u8 {
        let (size, align) = Self::effective_size(layout);

        // First-fit: percorre a lista procurando um bloco que comporte
        // `size` respeitando `align` (com split do excedente).
        let mut prev: Option<NonNull<FreeNode>> = None;
        let mut current = self.head;

        while let Some(node_ptr) = current {
            // SAFETY: nós da free list são blocos válidos do heap.
            let node = unsafe { node_ptr.as_ref() };
            let block_start = node_ptr.as_ptr() as usize;
            let block_size = node.size;
            let next = node.next;

            let aligned_start = block_start.next_multiple_of(align);
            let head_gap = aligned_start - block_start;

            if head_gap + size <= block_size {
                let tail_gap = block_size - head_gap - size;

                // SAFETY: os ponteiros recalculados ficam dentro do bloco.
                unsafe {
                    // Remover o bloco da lista
                    match prev {
                        Some(mut p) => p.as_mut().next = next,
                        None => self.head = next,
                    }

                    // Devolver a sobra da frente (se couber um nó)
                    if head_gap >= MIN_BLOCK {
                        self.insert_free(block_start, head_gap);
                    }
                    // Devolver a sobra de trás
                    if tail_gap >= MIN_BLOCK {
                        self.insert_free(aligned_start + size, tail_gap);
                    }
                }

                self.allocated_bytes += size;
                return aligned_start as *mut u8;
            }

            prev = current;
            current = next;
        }

        ptr::null_mut()
    }

    fn dealloc(&mut self, ptr_addr: *mut u8, layout: Layout) {
        let (size, _) = Self::effective_size(layout);
        let addr = ptr_addr as usize;

        if addr < self.heap_start || addr + size > self.heap_start + self.heap_size {
            // Ponteiro fora do heap: bug sério, mas não corromper a lista.
            return;
        }

        self.allocated_bytes -= size;
        // SAFETY: o bloco pertencia ao heap e acabou de ser devolvido.
        unsafe {
            self.insert_free(addr, size);
        }
    }

    /// Insere um bloco livre mantendo a ordem por endereço e coalescendo
    /// com os vizinhos imediatos.
    unsafe fn insert_free(&mut self, addr: usize, size: usize) {
        let mut prev: Option<NonNull<FreeNode>> = None;
        let mut current = self.head;

        while let Some(node_ptr) = current {
            if node_ptr.as_ptr() as usize > addr {
                break;
            }
            prev = current;
            current = node_ptr.as_ref().next;
        }

        let mut new_addr = addr;
        let mut new_size = size;

        // Coalescer com o vizinho anterior
        if let Some(mut p) = prev {
            let p_addr = p.as_ptr() as usize;
            let p_size = p.as_ref().size;
            if p_addr + p_size == new_addr {
                new_addr = p_addr;
                new_size += p_size;
                prev = self.find_prev(p_addr);
                // Retira o anterior da lista (será substituído pelo merge)
                match prev {
                    Some(mut pp) => pp.as_mut().next = p.as_ref().next,
                    None => self.head = p.as_ref().next,
                }
                current = match prev {
                    Some(pp) => pp.as_ref().next,
                    None => self.head,
                };
            }
        }

        // Coalescer com o vizinho seguinte
        if let Some(n) = current {
            let n_addr = n.as_ptr() as usize;
            if new_addr + new_size == n_addr {
                new_size += n.as_ref().size;
                current = n.as_ref().next;
            }
        }

        // Escrever o nó resultante e religar a lista
        let node = new_addr as *mut FreeNode;
        node.write(FreeNode {
            size: new_size,
            next: current,
        });
        match prev {
            Some(mut p) => p.as_mut().next = NonNull::new(node),
            None => self.head = NonNull::new(node),
        }
    }

    /// Encontra o nó imediatamente anterior a `addr` na lista.
    unsafe fn find_prev(&self, addr: usize) -> Option<NonNull<FreeNode>> {
        let mut prev: Option<NonNull<FreeNode>> = None;
        let mut current = self.head;
        while let Some(node_ptr) = current {
            if node_ptr.as_ptr() as usize >= addr {
                break;
            }
            prev = current;
            current = node_ptr.as_ref().next;
        }
        prev
    }

    /// Bytes atualmente alocados.
    pub fn allocated(&self) -> usize {
        self.allocated_bytes
    }
}

/// Encapsula a free list protegida por Spinlock.
pub struct LockedHeap {
    inner: Spinlock<FreeListAllocator>,
}

impl LockedHeap {
    /// Construção em tempo de compilação — sem heap ainda.
    pub const fn empty() -> Self {
        Self {
            inner: Spinlock::new(FreeListAllocator::new()),
        }
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner.lock().alloc(layout)
    }

    unsafe fn dealloc(&self, ptr_addr: *mut u8, layout: Layout) {
        self.inner.lock().dealloc(ptr_addr, layout)
    }
}

/// Inicializa o heap do kernel com uma região contígua do PMM.
///
/// # Safety
/// Chamar exatamente uma vez, após `pmm::init`.
pub unsafe fn init() {
    let frames = pmm::frames_for(HEAP_SIZE);
    let phys = pmm::alloc_frames(frames).expect("Heap: PMM sem memória para o heap do kernel");

    ALLOCATOR.inner.lock().add_region(phys as usize, HEAP_SIZE);

    crate::kinfo!(
        "(Heap) {} KiB em {:#x} (free list, identity-mapped)",
        HEAP_SIZE / 1024,
        phys
    );
}

/// Bytes atualmente alocados no heap (estatística).
pub fn allocated_bytes() -> usize {
    ALLOCATOR.inner.lock().allocated()
}
