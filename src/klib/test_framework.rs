//! # Framework de Self-Tests do Kernel
//!
//! Fornece estruturas e macros para testes padronizados, executados durante
//! o boot (após os inits, antes do primeiro processo de usuário).
//!
//! # Uso
//! ```ignore
//! pub const MY_TESTS: &[TestCase] = &[
//!     TestCase::new("algo_basico", test_algo_basico),
//! ];
//! run_test_suite("Meu Módulo", MY_TESTS);
//! ```

/// Resultado de um teste individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    /// Teste passou com sucesso.
    Pass,
    /// Teste falhou.
    Fail,
    /// Teste foi pulado (não aplicável no contexto atual).
    Skip,
}

/// Estrutura para um caso de teste.
pub struct TestCase {
    /// Nome do teste (para logging).
    pub name: &'static str,
    /// Função que executa o teste.
    pub func: fn() -> TestResult,
}

impl TestCase {
    /// Cria um novo caso de teste.
    pub const fn new(name: &'static str, func: fn() -> TestResult) -> Self {
        Self { name, func }
    }

    /// Executa o teste e retorna o resultado.
    pub fn run(&self) -> TestResult {
        let result = (self.func)();
        match result {
            TestResult::Pass => crate::kinfo!("[Test] ✓ {}", self.name),
            TestResult::Fail => crate::kerror!("[Test] ✗ {}", self.name),
            TestResult::Skip => crate::kwarn!("[Test] ⊘ {}", self.name),
        }
        result
    }
}

/// Executa uma suíte de testes.
///
/// Se algum teste falhar, o kernel entra em panic — o sistema só prossegue
/// para userspace se todos os testes passarem.
pub fn run_test_suite(suite_name: &str, tests: &[TestCase]) {
    crate::kinfo!("── SUITE: {} ({} testes)", suite_name, tests.len());

    let mut passed = 0usize;
    let mut skipped = 0usize;

    let mut i = 0;
    while i < tests.len() {
        match tests[i].run() {
            TestResult::Pass => passed += 1,
            TestResult::Fail => {
                crate::kerror!("SUITE FALHOU: {}", suite_name);
                panic!("Self-test falhou — kernel parado");
            }
            TestResult::Skip => skipped += 1,
        }
        i += 1;
    }

    if skipped > 0 {
        crate::kinfo!("── OK: {} ({} pass, {} skip)", suite_name, passed, skipped);
    } else {
        crate::kinfo!("── OK: {} ({} pass)", suite_name, passed);
    }
}

/// Asserção em testes: se a condição for falsa, loga e retorna `Fail`.
#[macro_export]
macro_rules! kassert {
    ($cond:expr) => {
        if !($cond) {
            $crate::kerror!("ASSERT FALHOU: {}", stringify!($cond));
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            $crate::kerror!("ASSERT FALHOU: {}", $msg);
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
}

/// Asserção de igualdade.
#[macro_export]
macro_rules! kassert_eq {
    ($left:expr, $right:expr) => {{
        let l = $left;
        let r = $right;
        if l != r {
            $crate::kerror!("ASSERT FALHOU: {} != {}", stringify!($left), stringify!($right));
            $crate::kerror!("  left  = {:?}", l);
            $crate::kerror!("  right = {:?}", r);
            return $crate::klib::test_framework::TestResult::Fail;
        }
    }};
}
