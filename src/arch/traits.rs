//! Contratos da camada de arquitetura.
//!
//! O resto do kernel só conversa com a CPU através desta trait — assim o
//! código dos subsistemas permanece pura transformação de dados.

/// Operações de CPU exigidas pelo kernel.
pub trait CpuOps {
    /// Verifica se interrupções estão habilitadas (flag IF).
    fn interrupts_enabled() -> bool;

    /// Habilita interrupções (STI).
    fn enable_interrupts();

    /// Desabilita interrupções (CLI).
    fn disable_interrupts();

    /// Espera a próxima interrupção (HLT). Retorna após o handler.
    fn halt();

    /// Hint de spin-loop (PAUSE).
    fn pause();

    /// Congela a CPU permanentemente. Último recurso.
    fn hang() -> !;

    /// Time Stamp Counter — relógio monotônico de ciclos.
    fn rdtsc() -> u64;

    /// Lê CR2 (endereço da última page fault).
    fn read_cr2() -> u64;

    /// Lê a raiz da page table ativa (CR3, sem bits de flag).
    fn read_cr3() -> u64;

    /// Troca a raiz da page table ativa.
    ///
    /// # Safety
    /// `phys` deve apontar para uma PML4 válida que mapeie o código em
    /// execução. Nunca trocar CR3 segurando um endereço virtual que só
    /// exista no contexto antigo.
    unsafe fn write_cr3(phys: u64);
}
