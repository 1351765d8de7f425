//! Interface de Handoff (Bootloader → Kernel).
//!
//! Define a estrutura de dados (ABI) passada ao `kernel_main`.
//!
//! # Industrial Standard
//! - Structs `#[repr(C)]` para garantia de layout.
//! - Tipos primitivos (`u64`, `u32`) para portabilidade.
//! - Magic number para validação.

/// Assinatura mágica esperada do bootloader ("MERIDIAN").
pub const BOOT_MAGIC: u64 = 0x4D45_5249_4449_414E;

/// Versão do protocolo de boot.
pub const BOOT_INFO_VERSION: u32 = 1;

/// Tipo de região do mapa de memória física (E820 destilado).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Usable = 1,
    Reserved = 2,
}

/// Uma região contígua de memória física.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemoryRange {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryKind,
}

/// Estrutura de informações de boot.
/// Deve ser mantida em sincronia binária exata com o bootloader.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BootInfo {
    /// Assinatura para validação (deve ser igual a BOOT_MAGIC).
    pub magic: u64,

    /// Versão do protocolo de boot.
    pub version: u32,
    _pad: u32,

    /// Mapa de memória física.
    pub memory_map_addr: u64,
    pub memory_map_len: u64,

    /// Localização física do kernel.
    pub kernel_phys_addr: u64,
    pub kernel_size: u64,
}

impl BootInfo {
    /// Visão tipada do mapa de memória.
    ///
    /// # Safety
    /// O bootloader garante que `memory_map_addr` aponta para
    /// `memory_map_len` entradas válidas na região identity-mapped.
    pub unsafe fn memory_ranges(&self) -> &'static [MemoryRange] {
        core::slice::from_raw_parts(
            self.memory_map_addr as *const MemoryRange,
            self.memory_map_len as usize,
        )
    }
}
