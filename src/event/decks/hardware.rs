//! Hardware Deck — timers (e, futuramente, dispositivos).
//!
//! Único deck que usa o caminho Suspend: `TimerSleep` estaciona a entry num
//! slot de timer, marca `Suspended` e retorna SEM completar. O poll
//! periódico (`poll_timers`, chamado do tick) completa a entry quando o
//! prazo vence, devolvendo-a ao estado `Processing` — o próximo scan do
//! Guide a leva adiante na rota. A entry nunca roda na linha do tempo de um
//! processo durante o sleep.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::drivers::timer;
use crate::event::routing::{RoutingEntry, StepResult, ROUTING_TABLE};
use crate::sync::Spinlock;
use crate::sys::ErrorCode;

// Tipos de evento (faixa 300..399)
pub const HW_TIMER_CREATE: u32 = 300;
pub const HW_TIMER_CANCEL: u32 = 301;
pub const HW_TIMER_SLEEP: u32 = 302;
pub const HW_TIMER_GETTICKS: u32 = 303;

/// Slots de timer disponíveis.
pub const MAX_TIMERS: usize = 64;

/// Prazo máximo aceito (1 hora).
const MAX_DELAY_MS: u64 = 3_600_000;

/// Um slot de timer.
#[derive(Clone, Copy)]
struct TimerSlot {
    id: u64,
    owner_workflow: u64,
    /// Tick de expiração.
    due_tick: u64,
    /// 0 = one-shot; senão, período em ticks.
    interval_ticks: u64,
    /// Entry suspensa aguardando este timer (caminho do sleep).
    suspended_event: Option<u64>,
    active: bool,
}

const IDLE_SLOT: TimerSlot = TimerSlot {
    id: 0,
    owner_workflow: 0,
    due_tick: 0,
    interval_ticks: 0,
    suspended_event: None,
    active: false,
};

static TIMERS: Spinlock<[TimerSlot; MAX_TIMERS]> = Spinlock::new([IDLE_SLOT; MAX_TIMERS]);
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

pub fn init() {
    crate::kinfo!("(Hardware) {} slots de timer disponíveis", MAX_TIMERS);
}

/// Reserva um slot. `suspended_event` liga o slot a uma entry suspensa.
fn timer_create(
    delay_ms: u64,
    interval_ms: u64,
    owner_workflow: u64,
    suspended_event: Option<u64>,
) -> Result<u64, ErrorCode> {
    let mut timers = TIMERS.lock();
    let slot = timers
        .iter_mut()
        .find(|t| !t.active)
        .ok_or(ErrorCode::HwTimerSlotsFull)?;

    let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
    *slot = TimerSlot {
        id,
        owner_workflow,
        due_tick: timer::ticks() + timer::ms_to_ticks(delay_ms),
        interval_ticks: if interval_ms > 0 {
            timer::ms_to_ticks(interval_ms)
        } else {
            0
        },
        suspended_event,
        active: true,
    };

    crate::ktrace!(
        "(Hardware) timer {} criado: delay={}ms interval={}ms",
        id,
        delay_ms,
        interval_ms
    );
    Ok(id)
}

fn timer_cancel(timer_id: u64) -> bool {
    let mut timers = TIMERS.lock();
    if let Some(slot) = timers.iter_mut().find(|t| t.active && t.id == timer_id) {
        slot.active = false;
        slot.suspended_event = None;
        true
    } else {
        false
    }
}

/// Poll de expiração — chamado uma vez por tick, fora da linha do tempo de
/// qualquer processo.
pub fn poll_timers(now_tick: u64) {
    // Coletar expirados com o lock; completar entries sem ele (a conclusão
    // toca o bucket lock da routing table).
    let mut expired: [Option<u64>; MAX_TIMERS] = [None; MAX_TIMERS];
    let mut count = 0;

    {
        let mut timers = TIMERS.lock();
        for slot in timers.iter_mut() {
            if !slot.active || now_tick < slot.due_tick {
                continue;
            }

            if let Some(event_id) = slot.suspended_event.take() {
                expired[count] = Some(event_id);
                count += 1;
            }

            if slot.interval_ticks > 0 {
                slot.due_tick = now_tick + slot.interval_ticks;
            } else {
                slot.active = false;
            }
        }
    }

    // Retomar as entries suspensas: o sleep completa sem resultado e a
    // entry volta para Processing — o próximo scan a reencaminha.
    for event_id in expired.iter().flatten() {
        let resumed = ROUTING_TABLE.with_entry_mut(*event_id, |entry| {
            entry.complete_step(None);
            entry.resume();
        });
        if resumed.is_some() {
            crate::ktrace!("(Hardware) entry {} retomada após sleep", event_id);
        } else {
            crate::kwarn!("(Hardware) timer expirou mas entry {} sumiu", event_id);
        }
    }
}

/// Lê um u64 little-endian do payload.
fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Processa um evento do Hardware Deck.
pub fn process(entry: &mut RoutingEntry) {
    let event_type = entry.event.event_type;

    if !(300..400).contains(&event_type) {
        entry.fail(
            ErrorCode::InvalidParameter,
            "tipo fora da faixa do Hardware Deck (300..399)",
        );
        return;
    }

    match event_type {
        HW_TIMER_CREATE => {
            // Payload: [delay_ms:u64][interval_ms:u64]
            let data = entry.event.data();
            let (Some(delay_ms), Some(interval_ms)) = (read_u64(data, 0), read_u64(data, 8))
            else {
                entry.fail(ErrorCode::InvalidParameter, "timer create sem parâmetros");
                return;
            };
            if delay_ms == 0 || delay_ms > MAX_DELAY_MS || interval_ms > MAX_DELAY_MS {
                entry.fail(ErrorCode::InvalidParameter, "timer create: prazo inválido");
                return;
            }

            match timer_create(delay_ms, interval_ms, entry.workflow_id, None) {
                Ok(id) => entry.complete_step(Some(StepResult::Value(id))),
                Err(code) => entry.fail(code, "timer create"),
            }
        }

        HW_TIMER_CANCEL => {
            // Payload: [timer_id:u64]
            let Some(timer_id) = read_u64(entry.event.data(), 0) else {
                entry.fail(ErrorCode::InvalidParameter, "timer cancel sem id");
                return;
            };
            if timer_id == 0 {
                entry.fail(ErrorCode::InvalidParameter, "timer cancel: id zero");
                return;
            }
            if timer_cancel(timer_id) {
                entry.complete_step(None);
            } else {
                entry.fail(ErrorCode::HwTimerNotFound, "timer cancel: não encontrado");
            }
        }

        HW_TIMER_SLEEP => {
            // Payload: [ms:u64] — caminho Suspend.
            let Some(ms) = read_u64(entry.event.data(), 0) else {
                entry.fail(ErrorCode::InvalidParameter, "sleep sem duração");
                return;
            };
            if ms == 0 || ms > MAX_DELAY_MS {
                entry.fail(ErrorCode::InvalidParameter, "sleep: duração inválida");
                return;
            }

            match timer_create(ms, 0, entry.workflow_id, Some(entry.event_id)) {
                Ok(timer_id) => {
                    // NÃO completa o passo — timer_check fará isso na
                    // expiração. A entry sai do fluxo normal.
                    entry.suspend();
                    crate::ktrace!(
                        "(Hardware) entry {} suspensa por {}ms (timer {})",
                        entry.event_id,
                        ms,
                        timer_id
                    );
                }
                Err(code) => entry.fail(code, "sleep: sem slot de timer"),
            }
        }

        HW_TIMER_GETTICKS => {
            entry.complete_step(Some(StepResult::Value(timer::ticks())));
        }

        _ => {
            entry.fail(ErrorCode::HwDeviceNotFound, "operação de hardware desconhecida");
        }
    }
}
