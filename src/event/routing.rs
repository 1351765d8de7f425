//! Routing Table — coleção chaveada dos eventos em voo.
//!
//! Um `RoutingEntry` por evento, do ingest até o Execution stage. A tabela
//! é um hash map de buckets (lista por bucket, lock por bucket) e é a DONA
//! das entries: remoção libera exatamente uma vez.
//!
//! Invariantes:
//! - A rota é read-only depois do ingest.
//! - `current_index` só cresce.
//! - `step_results[i]` é escrito no máximo uma vez, pelo deck na posição i.
//! - `Suspended` significa que algum deck destacou a entry do fluxo normal
//!   e é responsável por retomá-la (hoje: só o timer do Hardware Deck).

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use super::ring::{RingEvent, EVENT_PAYLOAD_SIZE, MAX_ROUTE_STEPS};
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::sync::Spinlock;
use crate::sys::ErrorCode;

/// Buckets da tabela (índice = event_id % BUCKETS).
pub const BUCKET_COUNT: usize = 64;

/// Estado de vida de uma entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Avançando pela rota.
    Processing,
    /// Destacada do fluxo por um deck (timer pendente).
    Suspended,
    /// Rota esgotada, aguardando o Execution stage.
    Completed,
    /// Erro: vai direto para o Execution stage reportar.
    Aborted,
}

/// Resultado tipado de um passo da rota.
///
/// O tipo determina o descarte no Execution stage: `Heap` é liberado no
/// drop (exaustividade do enum elimina a classe "esqueci de liberar"),
/// `Value`/`Static` não possuem nada, `Mapped` fica para o teardown do
/// processo.
pub enum StepResult {
    /// Valor imediato (hash, contador, handle).
    Value(u64),
    /// Referência a dados estáticos do kernel.
    Static(&'static [u8]),
    /// Buffer do heap do kernel — liberado quando a entry some.
    Heap(Box<[u8]>),
    /// Região física mapeada; unmapping adiado para o teardown.
    Mapped { phys: u64, pages: usize },
}

impl StepResult {
    /// Serializa o resultado em `dst`, devolvendo o tamanho real.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        match self {
            StepResult::Value(v) => {
                let bytes = v.to_le_bytes();
                let len = bytes.len().min(dst.len());
                dst[..len].copy_from_slice(&bytes[..len]);
                len
            }
            StepResult::Static(data) => {
                let len = data.len().min(dst.len());
                dst[..len].copy_from_slice(&data[..len]);
                len
            }
            StepResult::Heap(data) => {
                let len = data.len().min(dst.len());
                dst[..len].copy_from_slice(&data[..len]);
                len
            }
            StepResult::Mapped { phys, .. } => {
                let bytes = phys.to_le_bytes();
                let len = bytes.len().min(dst.len());
                dst[..len].copy_from_slice(&bytes[..len]);
                len
            }
        }
    }

    /// Tamanho em bytes da serialização.
    pub fn byte_len(&self) -> usize {
        match self {
            StepResult::Value(_) | StepResult::Mapped { .. } => 8,
            StepResult::Static(data) => data.len(),
            StepResult::Heap(data) => data.len(),
        }
    }
}

/// Cópia kernel-owned do evento originador.
pub struct EventCopy {
    pub event_type: u32,
    pub payload: [u8; EVENT_PAYLOAD_SIZE],
    pub payload_size: u32,
}

impl EventCopy {
    /// Payload válido como slice.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.payload_size as usize]
    }
}

/// Um evento em voo.
pub struct RoutingEntry {
    pub event_id: u64,
    pub workflow_id: u64,
    /// Processo que submeteu (None = submissão interna do kernel).
    /// O Execution stage entrega o resultado no ring DESTE processo.
    pub origin_pid: Option<u64>,
    pub event: EventCopy,
    /// Rota (read-only após o ingest; 0 termina → Execution implícito).
    pub route: [u8; MAX_ROUTE_STEPS],
    /// Cursor da rota (só cresce).
    pub current_index: usize,
    pub state: EntryState,
    pub error: Option<ErrorCode>,
    pub aborted: bool,
    /// Já está em alguma fila do Guide? (evita enfileirar duas vezes)
    pub queued: bool,
    pub created_at: u64,
    pub step_results: [Option<StepResult>; MAX_ROUTE_STEPS],
    pub step_stamps: [u64; MAX_ROUTE_STEPS],
}

impl RoutingEntry {
    /// Prefixo do deck no cursor atual (0 = rota esgotada).
    #[inline]
    pub fn current_prefix(&self) -> u8 {
        if self.current_index >= MAX_ROUTE_STEPS {
            0
        } else {
            self.route[self.current_index]
        }
    }

    /// Registra o resultado do passo atual e avança o cursor.
    /// `None` é um passo sem resultado (ex: timer cancel).
    pub fn complete_step(&mut self, result: Option<StepResult>) {
        debug_assert!(self.current_index < MAX_ROUTE_STEPS);
        debug_assert!(self.step_results[self.current_index].is_none());
        self.step_results[self.current_index] = result;
        self.step_stamps[self.current_index] = Cpu::rdtsc();
        self.current_index += 1;
    }

    /// Marca a entry com erro; o próximo scan a leva ao Execution stage.
    pub fn fail(&mut self, code: ErrorCode, context: &str) {
        crate::kwarn!(
            "(Deck) evento {} falhou: {:#06x} {} — {}",
            self.event_id,
            code.as_u32(),
            code.as_str(),
            context
        );
        self.error = Some(code);
        self.aborted = true;
        self.state = EntryState::Aborted;
    }

    /// Destaca a entry do fluxo (caminho do timer).
    pub fn suspend(&mut self) {
        self.state = EntryState::Suspended;
    }

    /// Retoma uma entry suspensa.
    pub fn resume(&mut self) {
        debug_assert!(self.state == EntryState::Suspended);
        self.state = EntryState::Processing;
    }

    /// Último resultado não-vazio da rota (índice + resultado).
    pub fn last_result_index(&self) -> Option<usize> {
        (0..MAX_ROUTE_STEPS)
            .rev()
            .find(|&i| self.step_results[i].is_some())
    }
}

type Bucket = Vec<Box<RoutingEntry>>;

/// A tabela de roteamento global.
pub struct RoutingTable {
    buckets: [Spinlock<Bucket>; BUCKET_COUNT],
    total_entries: AtomicU64,
    collisions: AtomicU64,
    ingested: AtomicU64,
    next_event_id: AtomicU64,
}

pub static ROUTING_TABLE: RoutingTable = RoutingTable::new();

impl RoutingTable {
    pub const fn new() -> Self {
        Self {
            buckets: [const { Spinlock::new(Vec::new()) }; BUCKET_COUNT],
            total_entries: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            ingested: AtomicU64::new(0),
            next_event_id: AtomicU64::new(1),
        }
    }

    #[inline]
    fn bucket_of(&self, event_id: u64) -> &Spinlock<Bucket> {
        &self.buckets[(event_id % BUCKET_COUNT as u64) as usize]
    }

    /// Único ponto onde memória do usuário atravessa para o kernel:
    /// atribui id monotônico, carimba timestamp, copia payload e rota,
    /// zera o cursor e insere. Retorna o event_id atribuído.
    pub fn add_from_ring_event(&self, ring_event: &RingEvent) -> Option<u64> {
        let event_id = self.next_event_id.fetch_add(1, Ordering::Relaxed);

        let mut payload = [0u8; EVENT_PAYLOAD_SIZE];
        let size = (ring_event.payload_size as usize).min(EVENT_PAYLOAD_SIZE);
        payload[..size].copy_from_slice(&ring_event.payload[..size]);

        let entry = Box::new(RoutingEntry {
            event_id,
            workflow_id: ring_event.workflow_id,
            origin_pid: crate::process::current_pid(),
            event: EventCopy {
                event_type: ring_event.event_type,
                payload,
                payload_size: size as u32,
            },
            route: ring_event.route,
            current_index: 0,
            state: EntryState::Processing,
            error: None,
            aborted: false,
            queued: false,
            created_at: Cpu::rdtsc(),
            step_results: [const { None }; MAX_ROUTE_STEPS],
            step_stamps: [0; MAX_ROUTE_STEPS],
        });

        self.insert(entry);
        self.ingested.fetch_add(1, Ordering::Relaxed);

        ktrace_route(event_id, &ring_event.route);
        Some(event_id)
    }

    /// Insere uma entry já construída.
    pub fn insert(&self, entry: Box<RoutingEntry>) {
        let mut bucket = self.bucket_of(entry.event_id).lock();
        if !bucket.is_empty() {
            self.collisions.fetch_add(1, Ordering::Relaxed);
        }
        bucket.push(entry);
        self.total_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// A entry existe?
    pub fn contains(&self, event_id: u64) -> bool {
        self.bucket_of(event_id)
            .lock()
            .iter()
            .any(|e| e.event_id == event_id)
    }

    /// Executa `f` com acesso exclusivo à entry (lock do bucket no escopo).
    pub fn with_entry_mut<R>(
        &self,
        event_id: u64,
        f: impl FnOnce(&mut RoutingEntry) -> R,
    ) -> Option<R> {
        let mut bucket = self.bucket_of(event_id).lock();
        bucket
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .map(|e| f(e))
    }

    /// Remove a entry transferindo a posse ao chamador (libera exatamente
    /// uma vez: quem recebe o Box decide quando dropar).
    pub fn take(&self, event_id: u64) -> Option<Box<RoutingEntry>> {
        let mut bucket = self.bucket_of(event_id).lock();
        let pos = bucket.iter().position(|e| e.event_id == event_id)?;
        self.total_entries.fetch_sub(1, Ordering::Relaxed);
        Some(bucket.swap_remove(pos))
    }

    /// Varre todos os buckets aplicando `f` a cada entry.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut RoutingEntry)) {
        for bucket in &self.buckets {
            let mut bucket = bucket.lock();
            for entry in bucket.iter_mut() {
                f(entry);
            }
        }
    }

    /// Entries em voo.
    pub fn len(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ktrace_route(event_id: u64, route: &[u8; MAX_ROUTE_STEPS]) {
    crate::ktrace!(
        "(Routing) evento {} ingerido, rota=[{},{},{},{}...]",
        event_id,
        route[0],
        route[1],
        route[2],
        route[3]
    );
}

/// Inicializa (loga) a tabela global.
pub fn init() {
    crate::kinfo!(
        "(Routing) Tabela pronta ({} buckets, capacidade ilimitada por bucket)",
        BUCKET_COUNT
    );
}

/// Estatísticas da tabela.
pub fn print_stats() {
    let table = &ROUTING_TABLE;
    crate::kprintln!(
        "[Routing] em voo={} ingeridos={} colisoes={}",
        table.total_entries.load(Ordering::Relaxed),
        table.ingested.load(Ordering::Relaxed),
        table.collisions.load(Ordering::Relaxed)
    );
}
