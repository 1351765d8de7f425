//! Operations Deck — computação pura e transformações.
//!
//! Hash (CRC32, DJB2), compressão (RLE) e cifra (XOR). Tudo síncrono:
//! cada evento completa ou falha dentro de `process`.

use alloc::vec;
use alloc::vec::Vec;

use crate::event::routing::{RoutingEntry, StepResult};
use crate::sys::ErrorCode;

// Tipos de evento (faixa 100..199)
pub const OP_CRC32: u32 = 100;
pub const OP_HASH_DJB2: u32 = 101;
pub const OP_RLE_COMPRESS: u32 = 102;
pub const OP_RLE_DECOMPRESS: u32 = 103;
pub const OP_XOR_CIPHER: u32 = 104;

/// Limite de expansão do RLE decompress (255 × 256 pares seria abusivo).
const RLE_MAX_OUTPUT: usize = 4096;

// ---------------------------------------------------------------------------
// CRC32 (tabela pré-computada em tempo de compilação)
// ---------------------------------------------------------------------------

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = build_crc32_table();

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Hash djb2 clássico (hash * 33 + c).
fn djb2(data: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &byte in data {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(byte as u64);
    }
    hash
}

// ---------------------------------------------------------------------------
// RLE
// ---------------------------------------------------------------------------

/// Compressão RLE: pares [byte][contagem], contagem ≤ 255.
fn rle_compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let current = input[i];
        let mut count = 1usize;
        while i + count < input.len() && input[i + count] == current && count < 255 {
            count += 1;
        }
        out.push(current);
        out.push(count as u8);
        i += count;
    }
    out
}

fn rle_decompress(input: &[u8]) -> Result<Vec<u8>, ErrorCode> {
    if input.is_empty() || input.len() % 2 != 0 {
        return Err(ErrorCode::OpInvalidInput);
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < input.len() {
        let byte = input[i];
        let count = input[i + 1] as usize;
        if count == 0 {
            return Err(ErrorCode::OpDecompressionFailed);
        }
        if out.len() + count > RLE_MAX_OUTPUT {
            return Err(ErrorCode::OpBufferTooSmall);
        }
        out.extend(core::iter::repeat(byte).take(count));
        i += 2;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Processamento
// ---------------------------------------------------------------------------

/// Processa um evento do Operations Deck.
pub fn process(entry: &mut RoutingEntry) {
    let event_type = entry.event.event_type;

    if !(100..200).contains(&event_type) {
        entry.fail(
            ErrorCode::InvalidParameter,
            "tipo fora da faixa do Operations Deck (100..199)",
        );
        return;
    }

    match event_type {
        OP_CRC32 => {
            let sum = crc32(entry.event.data());
            crate::ktrace!("(Ops) evento {}: crc32={:#010x}", entry.event_id, sum);
            entry.complete_step(Some(StepResult::Value(sum as u64)));
        }

        OP_HASH_DJB2 => {
            let hash = djb2(entry.event.data());
            entry.complete_step(Some(StepResult::Value(hash)));
        }

        OP_RLE_COMPRESS => {
            if entry.event.data().is_empty() {
                entry.fail(ErrorCode::OpInvalidInput, "compressão de payload vazio");
                return;
            }
            let compressed = rle_compress(entry.event.data());
            entry.complete_step(Some(StepResult::Heap(compressed.into_boxed_slice())));
        }

        OP_RLE_DECOMPRESS => match rle_decompress(entry.event.data()) {
            Ok(data) => entry.complete_step(Some(StepResult::Heap(data.into_boxed_slice()))),
            Err(code) => entry.fail(code, "descompressão RLE"),
        },

        OP_XOR_CIPHER => {
            // Payload: [chave:1][dados...]
            let data = entry.event.data();
            if data.len() < 2 {
                entry.fail(ErrorCode::OpInvalidInput, "cifra XOR precisa de chave + dados");
                return;
            }
            let key = data[0];
            let mut out = vec![0u8; data.len() - 1];
            for (i, &byte) in data[1..].iter().enumerate() {
                out[i] = byte ^ key;
            }
            entry.complete_step(Some(StepResult::Heap(out.into_boxed_slice())));
        }

        _ => {
            entry.fail(ErrorCode::OpInvalidOperation, "operação desconhecida");
        }
    }
}

/// CRC32 exposto para os self-tests (valor de referência conhecido).
pub fn crc32_of(data: &[u8]) -> u32 {
    crc32(data)
}

/// DJB2 exposto para os self-tests.
pub fn djb2_of(data: &[u8]) -> u64 {
    djb2(data)
}
