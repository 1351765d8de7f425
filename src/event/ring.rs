//! Ring buffers SPSC (single-producer/single-consumer) — user ↔ kernel.
//!
//! Comunicação assíncrona por memória compartilhada:
//! - `EventRing`: usuário produz, kernel consome (fila de submissão).
//! - `ResultRing`: kernel produz, usuário consome (fila de conclusão).
//!
//! `head` e `tail` são contadores de 64 bits monotônicos em cache lines
//! separadas (sem false sharing). Índice real = contador & (capacidade-1).
//! Cada lado possui exatamente um índice, então a única sincronização
//! necessária é o par release/acquire em torno de cada publicação.
//!
//! ATENÇÃO: estes rings ficam mapeados num espaço de usuário potencialmente
//! hostil. O `pop` do kernel COPIA o slot antes de qualquer validação —
//! nunca processar dados apontando para dentro do ring.

use core::cell::UnsafeCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicU64, Ordering};

/// Slots por ring (potência de 2 → módulo vira máscara).
pub const RING_CAPACITY: usize = 256;

/// Tamanho máximo do payload de um evento.
pub const EVENT_PAYLOAD_SIZE: usize = 512;

/// Passos máximos de uma rota (0 termina).
pub const MAX_ROUTE_STEPS: usize = 8;

/// Registro de submissão (layout ABI fixo: 576 bytes, 9 cache lines).
///
/// O gap de 4 bytes após `event_type` alinha `timestamp` em 8 bytes —
/// stubs de usuário DEVEM respeitar esse padding ou a submissão é
/// rejeitada na validação.
#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct RingEvent {
    /// 0 no submit; o kernel atribui no ingest.
    pub event_id: u64,
    /// Workflow ao qual o evento pertence.
    pub workflow_id: u64,
    /// Tipo do evento (faixas por deck: 1xx ops, 2xx storage, 3xx hw, 4xx net).
    pub event_type: u32,
    _pad: u32,
    /// 0 no submit; rdtsc() quando o kernel aceita.
    pub timestamp: u64,
    /// Rota pelos decks. Ex: [1,0,..] = Operations → Execution.
    pub route: [u8; MAX_ROUTE_STEPS],
    /// Dados do usuário (copiados por valor — sem ponteiros na ABI).
    pub payload: [u8; EVENT_PAYLOAD_SIZE],
    pub payload_size: u32,
    _reserved: [u8; 20],
}

impl RingEvent {
    /// Registro zerado.
    pub const fn empty() -> Self {
        Self {
            event_id: 0,
            workflow_id: 0,
            event_type: 0,
            _pad: 0,
            timestamp: 0,
            route: [0; MAX_ROUTE_STEPS],
            payload: [0; EVENT_PAYLOAD_SIZE],
            payload_size: 0,
            _reserved: [0; 20],
        }
    }

    /// Monta um evento de submissão (id/timestamp ficam com o kernel).
    pub fn new(workflow_id: u64, event_type: u32, route: [u8; MAX_ROUTE_STEPS], payload: &[u8]) -> Self {
        let mut ev = Self::empty();
        ev.workflow_id = workflow_id;
        ev.event_type = event_type;
        ev.route = route;
        let len = payload.len().min(EVENT_PAYLOAD_SIZE);
        ev.payload[..len].copy_from_slice(&payload[..len]);
        ev.payload_size = len as u32;
        ev
    }
}

/// Registro de conclusão (mesmo tamanho/alinhamento do RingEvent).
#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct RingResult {
    pub event_id: u64,
    pub workflow_id: u64,
    /// rdtsc() do momento da conclusão.
    pub completion_time: u64,
    /// 0 = sucesso; senão o código de erro.
    pub status: u32,
    pub error_code: u32,
    /// Tamanho real dos bytes válidos em `result`.
    pub result_size: u32,
    /// Resultado serializado por valor (último deck não-vazio da rota).
    pub result: [u8; EVENT_PAYLOAD_SIZE],
    _reserved: [u8; 28],
}

impl RingResult {
    pub const fn empty() -> Self {
        Self {
            event_id: 0,
            workflow_id: 0,
            completion_time: 0,
            status: 0,
            error_code: 0,
            result_size: 0,
            result: [0; EVENT_PAYLOAD_SIZE],
            _reserved: [0; 28],
        }
    }
}

// Garantias de ABI: qualquer mudança de layout quebra stubs de usuário.
const _: () = assert!(size_of::<RingEvent>() == 576);
const _: () = assert!(size_of::<RingResult>() == 576);
const _: () = assert!(RING_CAPACITY.is_power_of_two());

/// Um contador de ring numa cache line exclusiva.
#[repr(C, align(64))]
struct RingCounter(AtomicU64);

/// Fila de submissão: usuário → kernel.
#[repr(C)]
pub struct EventRing {
    head: RingCounter, // kernel lê (consumidor)
    tail: RingCounter, // usuário escreve (produtor)
    slots: [UnsafeCell<RingEvent>; RING_CAPACITY],
}

/// Fila de conclusão: kernel → usuário.
#[repr(C)]
pub struct ResultRing {
    head: RingCounter, // usuário lê (consumidor)
    tail: RingCounter, // kernel escreve (produtor)
    slots: [UnsafeCell<RingResult>; RING_CAPACITY],
}

const _: () = assert!(size_of::<EventRing>() == 128 + RING_CAPACITY * 576);
const _: () = assert!(size_of::<ResultRing>() == 128 + RING_CAPACITY * 576);

// SAFETY: SPSC — produtor e consumidor possuem cada um o seu índice; o
// UnsafeCell só é tocado entre o par release/acquire correspondente.
unsafe impl Sync for EventRing {}
unsafe impl Sync for ResultRing {}

macro_rules! impl_spsc_ring {
    ($ring:ident, $slot:ident) => {
        impl $ring {
            /// Zera os contadores e slots (feito uma vez na criação do
            /// processo; a região vem zerada do PMM de qualquer forma).
            ///
            /// # Safety
            /// `this` deve apontar para memória válida do tamanho do ring.
            pub unsafe fn init_in_place(this: *mut Self) {
                core::ptr::write_bytes(this as *mut u8, 0, size_of::<Self>());
            }

            /// Produz um registro. Falha (false) se o ring está cheio.
            pub fn push(&self, record: &$slot) -> bool {
                let tail = self.tail.0.load(Ordering::Relaxed);
                let head = self.head.0.load(Ordering::Acquire);

                if tail.wrapping_sub(head) >= RING_CAPACITY as u64 {
                    return false; // Cheio
                }

                let idx = (tail as usize) & (RING_CAPACITY - 1);
                // SAFETY: produtor único; o slot em `tail` não é visível ao
                // consumidor até a publicação do tail abaixo.
                unsafe {
                    core::ptr::write_volatile(self.slots[idx].get(), *record);
                }

                // Publica: o payload acima acontece-antes desta store
                self.tail.0.store(tail.wrapping_add(1), Ordering::Release);
                true
            }

            /// Consome um registro COPIANDO-o para `out`.
            /// Falha (false) se o ring está vazio.
            pub fn pop(&self, out: &mut $slot) -> bool {
                let head = self.head.0.load(Ordering::Relaxed);
                let tail = self.tail.0.load(Ordering::Acquire);

                if head == tail {
                    return false; // Vazio
                }

                let idx = (head as usize) & (RING_CAPACITY - 1);
                // SAFETY: consumidor único; o acquire do tail garante que o
                // payload do produtor já está visível.
                unsafe {
                    *out = core::ptr::read_volatile(self.slots[idx].get());
                }

                self.head.0.store(head.wrapping_add(1), Ordering::Release);
                true
            }

            pub fn is_empty(&self) -> bool {
                self.head.0.load(Ordering::Acquire) == self.tail.0.load(Ordering::Acquire)
            }

            pub fn is_full(&self) -> bool {
                let tail = self.tail.0.load(Ordering::Acquire);
                let head = self.head.0.load(Ordering::Acquire);
                tail.wrapping_sub(head) >= RING_CAPACITY as u64
            }

            /// Registros pendentes.
            pub fn len(&self) -> usize {
                let tail = self.tail.0.load(Ordering::Acquire);
                let head = self.head.0.load(Ordering::Acquire);
                tail.wrapping_sub(head) as usize
            }
        }
    };
}

impl_spsc_ring!(EventRing, RingEvent);
impl_spsc_ring!(ResultRing, RingResult);
