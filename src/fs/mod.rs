//! Tag-store — colaborador de filesystem do Storage Deck.
//!
//! Arquivos são blobs nomeados com tags de texto livre; a consulta é por
//! tag, não por diretório. Em memória por enquanto — o contrato visto pelo
//! core é create/read/write/tag/query + `sync()` no shutdown gracioso.

use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;

use crate::sys::ErrorCode;

/// Um arquivo no tag-store.
struct TaggedFile {
    name: String,
    tags: Vec<String>,
    data: Vec<u8>,
}

/// Armazenamento global.
static STORE: Mutex<Vec<TaggedFile>> = Mutex::new(Vec::new());

/// Limite de arquivos (proteção contra abuso de um deck).
const MAX_FILES: usize = 256;

/// Inicializa o tag-store.
pub fn init() {
    STORE.lock().clear();
    crate::kinfo!("(TagStore) Inicializado (in-memory, max {} arquivos)", MAX_FILES);
}

/// Cria (ou sobrescreve) um arquivo com o conteúdo dado.
pub fn create(name: &str, data: &[u8]) -> Result<(), ErrorCode> {
    if name.is_empty() {
        return Err(ErrorCode::InvalidParameter);
    }

    let mut store = STORE.lock();
    if let Some(file) = store.iter_mut().find(|f| f.name == name) {
        file.data.clear();
        file.data.extend_from_slice(data);
        return Ok(());
    }

    if store.len() >= MAX_FILES {
        return Err(ErrorCode::StorageDiskFull);
    }

    store.push(TaggedFile {
        name: String::from(name),
        tags: Vec::new(),
        data: data.to_vec(),
    });
    Ok(())
}

/// Lê o conteúdo de um arquivo.
pub fn read(name: &str) -> Result<Vec<u8>, ErrorCode> {
    let store = STORE.lock();
    store
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.data.clone())
        .ok_or(ErrorCode::StorageFileNotFound)
}

/// Sobrescreve o conteúdo de um arquivo existente.
pub fn write(name: &str, data: &[u8]) -> Result<usize, ErrorCode> {
    let mut store = STORE.lock();
    let file = store
        .iter_mut()
        .find(|f| f.name == name)
        .ok_or(ErrorCode::StorageFileNotFound)?;
    file.data.clear();
    file.data.extend_from_slice(data);
    Ok(data.len())
}

/// Adiciona uma tag a um arquivo.
pub fn tag_add(name: &str, tag: &str) -> Result<(), ErrorCode> {
    if tag.is_empty() {
        return Err(ErrorCode::InvalidParameter);
    }
    let mut store = STORE.lock();
    let file = store
        .iter_mut()
        .find(|f| f.name == name)
        .ok_or(ErrorCode::StorageFileNotFound)?;
    if !file.tags.iter().any(|t| t == tag) {
        file.tags.push(String::from(tag));
    }
    Ok(())
}

/// Consulta por tag: nomes dos arquivos marcados, separados por '\n'.
pub fn query_tag(tag: &str) -> Result<Vec<u8>, ErrorCode> {
    let store = STORE.lock();
    let mut out = Vec::new();
    for file in store.iter() {
        if file.tags.iter().any(|t| t == tag) {
            if !out.is_empty() {
                out.push(b'\n');
            }
            out.extend_from_slice(file.name.as_bytes());
        }
    }
    if out.is_empty() {
        return Err(ErrorCode::StorageTagNotFound);
    }
    Ok(out)
}

/// Flush no shutdown gracioso. Sem disco por trás, é só contabilidade.
pub fn sync() {
    let store = STORE.lock();
    let bytes: usize = store.iter().map(|f| f.data.len()).sum();
    crate::kinfo!("(TagStore) sync: {} arquivos, {} bytes", store.len(), bytes);
}
