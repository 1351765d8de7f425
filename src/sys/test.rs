//! Self-tests da taxonomia de erros.

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::sys::{ErrorCode, Severity};

pub const SYS_TESTS: &[TestCase] = &[
    TestCase::new("err_transientes", test_transient_table),
    TestCase::new("err_faixas_por_deck", test_deck_bands),
    TestCase::new("err_roundtrip_raw", test_raw_roundtrip),
    TestCase::new("err_severidade", test_severity),
];

/// A tabela de transiência: exatamente os seis recuperáveis.
fn test_transient_table() -> TestResult {
    crate::kassert!(ErrorCode::Timeout.is_transient());
    crate::kassert!(ErrorCode::ResourceBusy.is_transient());
    crate::kassert!(ErrorCode::StorageDiskFull.is_transient());
    crate::kassert!(ErrorCode::HwDeviceBusy.is_transient());
    crate::kassert!(ErrorCode::NetTimeout.is_transient());
    crate::kassert!(ErrorCode::NetHostUnreachable.is_transient());

    crate::kassert!(!ErrorCode::OpInvalidOperation.is_transient());
    crate::kassert!(!ErrorCode::StorageFileNotFound.is_transient());
    crate::kassert!(!ErrorCode::HwTimerNotFound.is_transient());
    crate::kassert!(!ErrorCode::NetNotConnected.is_transient());
    crate::kassert!(!ErrorCode::DependencyFailed.is_transient());
    crate::kassert!(!ErrorCode::InvalidParameter.is_transient());
    TestResult::Pass
}

/// O byte alto identifica o estágio de origem.
fn test_deck_bands() -> TestResult {
    crate::kassert_eq!(ErrorCode::Unknown.deck(), 0x00);
    crate::kassert_eq!(ErrorCode::OpCompressionFailed.deck(), 0x01);
    crate::kassert_eq!(ErrorCode::StorageDiskFull.deck(), 0x02);
    crate::kassert_eq!(ErrorCode::HwTimerSlotsFull.deck(), 0x03);
    crate::kassert_eq!(ErrorCode::NetHostUnreachable.deck(), 0x04);
    crate::kassert_eq!(ErrorCode::DependencyFailed.deck(), 0x05);
    TestResult::Pass
}

/// from_raw inverte as_u32; valores fora da tabela são rejeitados.
fn test_raw_roundtrip() -> TestResult {
    let samples = [
        ErrorCode::Timeout,
        ErrorCode::OpBufferTooSmall,
        ErrorCode::StorageTagNotFound,
        ErrorCode::HwDeviceBusy,
        ErrorCode::NetTimeout,
        ErrorCode::WorkflowCyclicDag,
    ];
    for code in samples {
        crate::kassert_eq!(ErrorCode::from_raw(code.as_u32()), Some(code));
    }
    crate::kassert_eq!(ErrorCode::from_raw(0), None);
    crate::kassert_eq!(ErrorCode::from_raw(0x9999), None);
    TestResult::Pass
}

fn test_severity() -> TestResult {
    crate::kassert!(ErrorCode::WorkflowAborted.severity() == Severity::Fatal);
    crate::kassert!(ErrorCode::Timeout.severity() == Severity::Warning);
    crate::kassert!(ErrorCode::OpInvalidInput.severity() == Severity::Error);
    TestResult::Pass
}

pub fn run_sys_tests() {
    run_test_suite("sys::error", SYS_TESTS);
}
