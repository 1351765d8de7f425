//! Storage Deck — memória e tag-store.
//!
//! Operações de página física (alloc/free/map) via PMM e operações de
//! arquivo no tag-store. Tudo síncrono.

use crate::event::routing::{RoutingEntry, StepResult};
use crate::fs;
use crate::mm::pmm::{self, FRAME_SIZE};
use crate::sys::ErrorCode;

// Tipos de evento (faixa 200..299)
pub const ST_MEM_ALLOC: u32 = 200;
pub const ST_MEM_FREE: u32 = 201;
pub const ST_MEM_MAP: u32 = 202;
pub const ST_FILE_CREATE: u32 = 210;
pub const ST_FILE_READ: u32 = 211;
pub const ST_FILE_WRITE: u32 = 212;
pub const ST_FILE_TAG_ADD: u32 = 213;
pub const ST_FILE_QUERY: u32 = 214;

/// Limite de uma alocação via deck (1 MiB — proteção contra abuso).
const MAX_ALLOC_BYTES: u64 = 1024 * 1024;

/// Lê um u64 little-endian do payload.
fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Divide o payload em "nome\0resto" (UTF-8 validado).
fn split_name(data: &[u8]) -> Option<(&str, &[u8])> {
    let pos = data.iter().position(|&b| b == 0)?;
    let name = core::str::from_utf8(&data[..pos]).ok()?;
    if name.is_empty() {
        return None;
    }
    Some((name, &data[pos + 1..]))
}

/// Payload inteiro como string UTF-8.
fn whole_str(data: &[u8]) -> Option<&str> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let s = core::str::from_utf8(&data[..end]).ok()?;
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Processa um evento do Storage Deck.
pub fn process(entry: &mut RoutingEntry) {
    let event_type = entry.event.event_type;

    if !(200..300).contains(&event_type) {
        entry.fail(
            ErrorCode::InvalidParameter,
            "tipo fora da faixa do Storage Deck (200..299)",
        );
        return;
    }

    match event_type {
        // === Memória ===
        ST_MEM_ALLOC => {
            // Payload: [bytes:u64]
            let Some(bytes) = read_u64(entry.event.data(), 0) else {
                entry.fail(ErrorCode::InvalidParameter, "mem alloc sem tamanho");
                return;
            };
            if bytes == 0 || bytes > MAX_ALLOC_BYTES {
                entry.fail(ErrorCode::InvalidParameter, "mem alloc com tamanho inválido");
                return;
            }
            let frames = pmm::frames_for(bytes as usize);
            match pmm::alloc_frames(frames) {
                Some(phys) => {
                    crate::ktrace!(
                        "(Storage) evento {}: alloc {} frames em {:#x}",
                        entry.event_id,
                        frames,
                        phys
                    );
                    entry.complete_step(Some(StepResult::Value(phys)));
                }
                None => entry.fail(ErrorCode::StorageDiskFull, "PMM sem frames contíguos"),
            }
        }

        ST_MEM_FREE => {
            // Payload: [phys:u64][bytes:u64]
            let data = entry.event.data();
            let (Some(phys), Some(bytes)) = (read_u64(data, 0), read_u64(data, 8)) else {
                entry.fail(ErrorCode::InvalidParameter, "mem free sem phys/tamanho");
                return;
            };
            if bytes == 0 || !pmm::FRAME_ALLOCATOR.lock().is_allocated(phys) {
                entry.fail(ErrorCode::InvalidParameter, "mem free de região não alocada");
                return;
            }
            pmm::free_frames(phys, pmm::frames_for(bytes as usize));
            entry.complete_step(None);
        }

        ST_MEM_MAP => {
            // Payload: [bytes:u64] — região devolvida como resultado Mapped;
            // o unmap fica para o teardown do processo.
            let Some(bytes) = read_u64(entry.event.data(), 0) else {
                entry.fail(ErrorCode::InvalidParameter, "mem map sem tamanho");
                return;
            };
            if bytes == 0 || bytes > MAX_ALLOC_BYTES {
                entry.fail(ErrorCode::InvalidParameter, "mem map com tamanho inválido");
                return;
            }
            let pages = pmm::frames_for(bytes as usize);
            match pmm::alloc_frames(pages) {
                Some(phys) => {
                    // Zerar a região antes de expor
                    // SAFETY: frames recém-alocados, identity-mapped.
                    unsafe {
                        core::ptr::write_bytes(phys as *mut u8, 0, pages * FRAME_SIZE);
                    }
                    entry.complete_step(Some(StepResult::Mapped { phys, pages }));
                }
                None => entry.fail(ErrorCode::StorageDiskFull, "PMM sem frames para map"),
            }
        }

        // === Tag-store ===
        ST_FILE_CREATE => {
            // Payload: "nome\0conteúdo"
            let Some((name, data)) = split_name(entry.event.data()) else {
                entry.fail(ErrorCode::InvalidParameter, "file create sem nome");
                return;
            };
            match fs::create(name, data) {
                Ok(()) => entry.complete_step(Some(StepResult::Value(data.len() as u64))),
                Err(code) => entry.fail(code, "file create"),
            }
        }

        ST_FILE_READ => {
            // Payload: "nome"
            let Some(name) = whole_str(entry.event.data()) else {
                entry.fail(ErrorCode::InvalidParameter, "file read sem nome");
                return;
            };
            match fs::read(name) {
                Ok(data) => entry.complete_step(Some(StepResult::Heap(data.into_boxed_slice()))),
                Err(code) => entry.fail(code, "file read"),
            }
        }

        ST_FILE_WRITE => {
            // Payload: "nome\0conteúdo"
            let Some((name, data)) = split_name(entry.event.data()) else {
                entry.fail(ErrorCode::InvalidParameter, "file write sem nome");
                return;
            };
            match fs::write(name, data) {
                Ok(written) => entry.complete_step(Some(StepResult::Value(written as u64))),
                Err(code) => entry.fail(code, "file write"),
            }
        }

        ST_FILE_TAG_ADD => {
            // Payload: "nome\0tag"
            let tag = split_name(entry.event.data())
                .and_then(|(name, rest)| whole_str(rest).map(|tag| (name, tag)));
            let Some((name, tag)) = tag else {
                entry.fail(ErrorCode::InvalidParameter, "tag add sem nome/tag");
                return;
            };
            match fs::tag_add(name, tag) {
                Ok(()) => entry.complete_step(None),
                Err(code) => entry.fail(code, "tag add"),
            }
        }

        ST_FILE_QUERY => {
            // Payload: "tag" → nomes separados por '\n'
            let Some(tag) = whole_str(entry.event.data()) else {
                entry.fail(ErrorCode::InvalidParameter, "query sem tag");
                return;
            };
            match fs::query_tag(tag) {
                Ok(names) => entry.complete_step(Some(StepResult::Heap(names.into_boxed_slice()))),
                Err(code) => entry.fail(code, "query por tag"),
            }
        }

        _ => {
            entry.fail(ErrorCode::OpInvalidOperation, "operação de storage desconhecida");
        }
    }
}
