//! Workflow Engine — DAGs de eventos como unidade de computação.
//!
//! Userspace registra workflows (um DAG de até 16 nós compartilhando uma
//! rota) e os ativa via `kernel_notify`. O engine submete os nós sem
//! dependências, recebe as conclusões do Execution stage e vai liberando a
//! cadeia conforme as dependências resolvem.
//!
//! Política de erro por workflow: Abort / Continue / Retry / Skip. Erros
//! transientes (ver `ErrorCode::is_transient`) respeitam a config de retry
//! com backoff exponencial REAL: o retry entra numa fila com tick de
//! vencimento e é resubmetido pelo pump do timer, não imediatamente.
//!
//! Invariantes:
//! - Registro rejeita qualquer DAG com ciclo (DFS com coloração).
//! - Um nó nunca é submetido com dependência pendente ou com erro.
//! - Um nó é submetido no máximo 1 + max_retries vezes por ativação.
//! - Resultado de nó tem UM dono (move a partir do Execution stage).

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use super::ring::{RingEvent, EVENT_PAYLOAD_SIZE, MAX_ROUTE_STEPS};
use super::routing::{StepResult, ROUTING_TABLE};
use crate::arch::traits::CpuOps;
use crate::arch::Cpu;
use crate::drivers::timer;
use crate::sync::Spinlock;
use crate::sys::ErrorCode;

/// Máximo de nós por workflow.
pub const MAX_NODES: usize = 16;
/// Máximo de dependências por nó.
pub const MAX_DEPS: usize = 8;
/// Tamanho máximo do nome.
pub const NAME_MAX: usize = 32;

/// Estado de vida de um workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Registered,
    Ready,
    Running,
    Waiting,
    Completed,
    Error,
}

/// Como reagir quando um nó falha de forma permanente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Para o workflow no primeiro erro (default).
    Abort,
    /// Continua com os demais nós; o falho fica marcado.
    Continue,
    /// Retry com backoff para erros transientes (exaustão age como Continue).
    Retry,
    /// Marca transitivamente todo dependente como erro ("dependency failed").
    Skip,
}

/// Configuração de retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u8,
    pub base_delay_ms: u32,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 100,
            exponential_backoff: true,
        }
    }
}

/// Especificação de um nó na hora do registro.
pub struct NodeSpec {
    pub event_type: u32,
    pub payload: Vec<u8>,
    pub deps: Vec<u32>,
}

impl NodeSpec {
    pub fn new(event_type: u32, payload: &[u8], deps: &[u32]) -> Self {
        Self {
            event_type,
            payload: payload.to_vec(),
            deps: deps.to_vec(),
        }
    }
}

/// Um vértice do DAG.
struct WorkflowNode {
    event_type: u32,
    payload: [u8; EVENT_PAYLOAD_SIZE],
    payload_size: u32,
    deps: [u32; MAX_DEPS],
    dep_count: u32,

    /// Já submetido nesta ativação?
    submitted: bool,
    completed: bool,
    error: bool,
    retry_count: u8,
    last_error: Option<ErrorCode>,

    /// Event id emitido na última submissão.
    event_id: u64,
    /// Resultado (posse transferida do Execution stage).
    result: Option<StepResult>,
    result_size: u64,
}

impl WorkflowNode {
    /// Zera o estado efêmero (registro e reativação).
    fn reset(&mut self) {
        self.submitted = false;
        self.completed = false;
        self.error = false;
        self.retry_count = 0;
        self.last_error = None;
        self.event_id = 0;
        self.result = None;
        self.result_size = 0;
    }

    fn resolved(&self) -> bool {
        self.completed || self.error
    }
}

/// Progresso de uma ativação.
struct ExecutionContext {
    activation_time: u64,
    total_nodes: u32,
    completed_nodes: u32,
    running_nodes: u32,
    error_count: u32,
    failed_node_index: u32,
}

/// Um workflow registrado.
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub owner_pid: u64,
    pub route: [u8; MAX_ROUTE_STEPS],
    nodes: Vec<WorkflowNode>,
    pub state: WorkflowState,
    ctx: Option<ExecutionContext>,
    pub error_policy: ErrorPolicy,
    pub retry: RetryConfig,
    pub registration_time: u64,
    activation_count: u64,
    total_execution_time: u64,
}

/// Registro global de workflows (heap-allocated, identidade estável).
struct Registry {
    workflows: Vec<Box<Workflow>>,
    next_id: u64,
}

static REGISTRY: Spinlock<Registry> = Spinlock::new(Registry {
    workflows: Vec::new(),
    next_id: 1,
});

/// Retry agendado: quem, qual nó e quando.
struct PendingRetry {
    workflow_id: u64,
    node_index: usize,
    due_tick: u64,
}

static RETRIES: Spinlock<Vec<PendingRetry>> = Spinlock::new(Vec::new());

pub fn init() {
    let registry = REGISTRY.lock();
    crate::kinfo!(
        "(Workflow) Engine pronto (max {} nós/workflow, {} registrados)",
        MAX_NODES,
        registry.workflows.len()
    );
}

// ---------------------------------------------------------------------------
// Validação do DAG
// ---------------------------------------------------------------------------

/// DFS com coloração: branco (0) → cinza (1) → preto (2). Qualquer aresta
/// para um nó cinza fecha um ciclo.
fn has_cycle(specs: &[NodeSpec]) -> bool {
    fn visit(specs: &[NodeSpec], colors: &mut [u8], node: usize) -> bool {
        colors[node] = 1;
        for &dep in &specs[node].deps {
            let dep = dep as usize;
            match colors[dep] {
                1 => return true, // aresta para cinza = ciclo
                0 => {
                    if visit(specs, colors, dep) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        colors[node] = 2;
        false
    }

    let mut colors = [0u8; MAX_NODES];
    for start in 0..specs.len() {
        if colors[start] == 0 && visit(specs, &mut colors, start) {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Registro
// ---------------------------------------------------------------------------

/// Registra um workflow. Retorna o id atribuído.
pub fn register(
    name: &str,
    route: [u8; MAX_ROUTE_STEPS],
    specs: &[NodeSpec],
    owner_pid: u64,
) -> Result<u64, ErrorCode> {
    if specs.len() > MAX_NODES {
        return Err(ErrorCode::WorkflowTooManyNodes);
    }

    // Dependências dentro dos limites
    for spec in specs {
        if spec.deps.len() > MAX_DEPS {
            return Err(ErrorCode::InvalidParameter);
        }
        for &dep in &spec.deps {
            if dep as usize >= specs.len() {
                return Err(ErrorCode::InvalidParameter);
            }
        }
    }

    // DAG acíclico é pré-condição de tudo que vem depois
    if has_cycle(specs) {
        return Err(ErrorCode::WorkflowCyclicDag);
    }

    let mut nodes = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut payload = [0u8; EVENT_PAYLOAD_SIZE];
        let size = spec.payload.len().min(EVENT_PAYLOAD_SIZE);
        payload[..size].copy_from_slice(&spec.payload[..size]);

        let mut deps = [0u32; MAX_DEPS];
        deps[..spec.deps.len()].copy_from_slice(&spec.deps);

        let mut node = WorkflowNode {
            event_type: spec.event_type,
            payload,
            payload_size: size as u32,
            deps,
            dep_count: spec.deps.len() as u32,
            submitted: false,
            completed: false,
            error: false,
            retry_count: 0,
            last_error: None,
            event_id: 0,
            result: None,
            result_size: 0,
        };
        node.reset();
        nodes.push(node);
    }

    let mut truncated = String::from(name);
    truncated.truncate(NAME_MAX);

    let mut registry = REGISTRY.lock();
    let id = registry.next_id;
    registry.next_id += 1;

    registry.workflows.push(Box::new(Workflow {
        id,
        name: truncated,
        owner_pid,
        route,
        nodes,
        state: WorkflowState::Registered,
        ctx: None,
        error_policy: ErrorPolicy::Abort,
        retry: RetryConfig::default(),
        registration_time: Cpu::rdtsc(),
        activation_count: 0,
        total_execution_time: 0,
    }));

    crate::kinfo!(
        "(Workflow) '{}' registrado (id={}, nós={}, rota=[{},{},{},{}...])",
        name,
        id,
        specs.len(),
        route[0],
        route[1],
        route[2],
        route[3]
    );

    Ok(id)
}

/// Remove um workflow do registro (resultados são dropados aqui).
pub fn unregister(workflow_id: u64) -> Result<(), ErrorCode> {
    let mut registry = REGISTRY.lock();
    let pos = registry
        .workflows
        .iter()
        .position(|w| w.id == workflow_id)
        .ok_or(ErrorCode::WorkflowNotFound)?;
    registry.workflows.swap_remove(pos);
    crate::kinfo!("(Workflow) id={} desregistrado", workflow_id);
    Ok(())
}

/// Ajusta a política de erro (e opcionalmente o retry) de um workflow.
pub fn configure(
    workflow_id: u64,
    policy: ErrorPolicy,
    retry: Option<RetryConfig>,
) -> Result<(), ErrorCode> {
    let mut registry = REGISTRY.lock();
    let workflow = registry
        .workflows
        .iter_mut()
        .find(|w| w.id == workflow_id)
        .ok_or(ErrorCode::WorkflowNotFound)?;
    workflow.error_policy = policy;
    if let Some(retry) = retry {
        workflow.retry = retry;
    }
    Ok(())
}

/// Estado atual de um workflow (POLL).
pub fn poll_state(workflow_id: u64) -> Option<WorkflowState> {
    let registry = REGISTRY.lock();
    registry
        .workflows
        .iter()
        .find(|w| w.id == workflow_id)
        .map(|w| w.state)
}

/// O id existe no registro?
pub fn exists(workflow_id: u64) -> bool {
    poll_state(workflow_id).is_some()
}

// ---------------------------------------------------------------------------
// Ativação e progresso
// ---------------------------------------------------------------------------

/// Dependências do nó `index` todas completas (e nenhuma com erro)?
fn deps_met(nodes: &[WorkflowNode], index: usize) -> bool {
    let node = &nodes[index];
    for d in 0..node.dep_count as usize {
        let dep = node.deps[d] as usize;
        if dep >= nodes.len() {
            return false;
        }
        if !nodes[dep].completed || nodes[dep].error {
            return false;
        }
    }
    true
}

/// Submete um nó como RingEvent herdando a rota do workflow.
/// Retorna o event_id atribuído.
fn submit_node(workflow: &mut Workflow, index: usize) -> Option<u64> {
    let node = &workflow.nodes[index];
    let ring_event = RingEvent::new(
        workflow.id,
        node.event_type,
        workflow.route,
        &node.payload[..node.payload_size as usize],
    );

    let event_id = ROUTING_TABLE.add_from_ring_event(&ring_event)?;

    // Resultado de nó pertence ao dono do workflow, não a quem por acaso
    // estiver rodando quando o evento concluir.
    let owner = workflow.owner_pid;
    ROUTING_TABLE.with_entry_mut(event_id, |entry| {
        entry.origin_pid = (owner != 0).then_some(owner);
    });

    let node = &mut workflow.nodes[index];
    node.submitted = true;
    node.event_id = event_id;
    if let Some(ctx) = workflow.ctx.as_mut() {
        ctx.running_nodes += 1;
    }

    crate::ktrace!(
        "(Workflow) id={} nó {} submetido (tipo={}, evento={})",
        workflow.id,
        index,
        workflow.nodes[index].event_type,
        event_id
    );
    Some(event_id)
}

/// Submete todo nó pendente cujas dependências acabaram de resolver.
fn submit_ready_nodes(workflow: &mut Workflow) {
    for index in 0..workflow.nodes.len() {
        let node = &workflow.nodes[index];
        if node.resolved() || node.submitted {
            continue;
        }
        if !deps_met(&workflow.nodes, index) {
            continue;
        }

        if submit_node(workflow, index).is_none() {
            let node = &mut workflow.nodes[index];
            node.error = true;
            node.last_error = Some(ErrorCode::SubmitFailed);
            if let Some(ctx) = workflow.ctx.as_mut() {
                ctx.error_count += 1;
            }
        }
    }
}

/// Fecha o workflow se todo nó está resolvido.
fn check_finished(workflow: &mut Workflow) {
    if workflow.state == WorkflowState::Completed || workflow.state == WorkflowState::Error {
        return;
    }
    if !workflow.nodes.iter().all(|n| n.resolved()) {
        return;
    }

    let errors = workflow.ctx.as_ref().map(|c| c.error_count).unwrap_or(0);
    if let Some(ctx) = workflow.ctx.as_ref() {
        let elapsed = Cpu::rdtsc().wrapping_sub(ctx.activation_time);
        workflow.total_execution_time = workflow.total_execution_time.wrapping_add(elapsed);
    }

    if errors > 0 || workflow.nodes.iter().any(|n| n.error) {
        workflow.state = WorkflowState::Error;
        crate::kwarn!(
            "(Workflow) '{}' (id={}) terminou COM ERROS ({})",
            workflow.name,
            workflow.id,
            errors
        );
    } else {
        workflow.state = WorkflowState::Completed;
        crate::kinfo!(
            "(Workflow) '{}' (id={}) COMPLETO (ciclos acumulados={})",
            workflow.name,
            workflow.id,
            workflow.total_execution_time
        );
    }
}

/// Ativa um workflow: reseta os nós e submete os sem dependências.
pub fn activate(workflow_id: u64, params: Option<&[u8]>) -> Result<(), ErrorCode> {
    let mut registry = REGISTRY.lock();
    let workflow = registry
        .workflows
        .iter_mut()
        .find(|w| w.id == workflow_id)
        .ok_or(ErrorCode::WorkflowNotFound)?;

    if workflow.state == WorkflowState::Running {
        return Err(ErrorCode::WorkflowAlreadyRunning);
    }

    // Contexto novo + estado efêmero zerado (resultados antigos dropam)
    workflow.ctx = Some(ExecutionContext {
        activation_time: Cpu::rdtsc(),
        total_nodes: workflow.nodes.len() as u32,
        completed_nodes: 0,
        running_nodes: 0,
        error_count: 0,
        failed_node_index: u32::MAX,
    });
    for node in workflow.nodes.iter_mut() {
        node.reset();
    }

    // Parâmetros da ativação alimentam o primeiro nó
    if let (Some(params), true) = (params, !workflow.nodes.is_empty()) {
        let node = &mut workflow.nodes[0];
        let size = params.len().min(EVENT_PAYLOAD_SIZE);
        node.payload[..size].copy_from_slice(&params[..size]);
        node.payload_size = size as u32;
    }

    workflow.activation_count += 1;

    // Workflow vazio completa imediatamente
    if workflow.nodes.is_empty() {
        workflow.state = WorkflowState::Completed;
        crate::kinfo!(
            "(Workflow) '{}' (id={}) vazio — completo na ativação",
            workflow.name,
            workflow_id
        );
        return Ok(());
    }

    workflow.state = WorkflowState::Running;
    submit_ready_nodes(workflow);
    check_finished(workflow);

    crate::kinfo!(
        "(Workflow) '{}' (id={}) ativado (ativação #{})",
        workflow.name,
        workflow_id,
        workflow.activation_count
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Callback de conclusão (vindo do Execution stage)
// ---------------------------------------------------------------------------

/// Marca transitivamente como erro todo nó pendente que dependa (direta ou
/// indiretamente) de um nó com erro.
fn skip_dependents(workflow: &mut Workflow) {
    loop {
        let mut to_mark: Vec<usize> = Vec::new();
        for index in 0..workflow.nodes.len() {
            let node = &workflow.nodes[index];
            if node.resolved() {
                continue;
            }
            let blocked = (0..node.dep_count as usize)
                .any(|d| workflow.nodes[node.deps[d] as usize].error);
            if blocked {
                to_mark.push(index);
            }
        }

        if to_mark.is_empty() {
            break;
        }
        for index in to_mark {
            let node = &mut workflow.nodes[index];
            node.error = true;
            node.last_error = Some(ErrorCode::DependencyFailed);
            if let Some(ctx) = workflow.ctx.as_mut() {
                ctx.error_count += 1;
            }
            crate::kinfo!(
                "(Workflow) nó {} pulado (dependência falhou)",
                index
            );
        }
    }
}

/// Agenda um retry com o atraso de backoff calculado.
fn schedule_retry(workflow: &Workflow, node_index: usize, retry_count: u8) {
    let base = workflow.retry.base_delay_ms as u64;
    let delay_ms = if workflow.retry.exponential_backoff {
        // 100ms, 200ms, 400ms, 800ms...
        base << (retry_count.saturating_sub(1) as u64)
    } else {
        base * retry_count as u64
    };

    let due_tick = timer::ticks() + timer::ms_to_ticks(delay_ms);
    RETRIES.lock().push(PendingRetry {
        workflow_id: workflow.id,
        node_index,
        due_tick,
    });

    crate::kinfo!(
        "(Workflow) retry {}/{} do nó {} em {}ms (erro transiente)",
        retry_count,
        workflow.retry.max_retries,
        node_index,
        delay_ms
    );
}

/// Integração evento → workflow: chamado pelo Execution stage para CADA
/// evento concluído. Recebe a POSSE do resultado.
pub fn on_event_completed(
    workflow_id: u64,
    event_id: u64,
    result: Option<StepResult>,
    result_size: u64,
    error: Option<ErrorCode>,
) {
    let mut registry = REGISTRY.lock();
    let Some(workflow) = registry.workflows.iter_mut().find(|w| w.id == workflow_id) else {
        // Resultado órfão: o drop do StepResult libera o que for Heap.
        crate::kwarn!(
            "(Workflow) evento {} concluído mas workflow {} não existe",
            event_id,
            workflow_id
        );
        return;
    };

    let Some(node_index) = workflow.nodes.iter().position(|n| n.event_id == event_id) else {
        crate::kwarn!(
            "(Workflow) evento {} não corresponde a nó algum do workflow {}",
            event_id,
            workflow_id
        );
        return;
    };

    if let Some(ctx) = workflow.ctx.as_mut() {
        ctx.running_nodes = ctx.running_nodes.saturating_sub(1);
    }

    match error {
        Some(code) => {
            // O resultado (se algum deck chegou a produzir) morre aqui.
            drop(result);

            let node = &mut workflow.nodes[node_index];
            node.last_error = Some(code);

            crate::kwarn!(
                "(Workflow) nó {} (evento {}) FALHOU: {:#06x} {}",
                node_index,
                event_id,
                code.as_u32(),
                code.as_str()
            );

            // Retry para erros transientes dentro do orçamento
            let retry_budget_left = node.retry_count < workflow.retry.max_retries;
            if workflow.retry.enabled && code.is_transient() && retry_budget_left {
                node.retry_count += 1;
                node.submitted = false;
                node.error = false;
                let retry_count = node.retry_count;
                schedule_retry(workflow, node_index, retry_count);
                return;
            }

            // Falha permanente
            let node = &mut workflow.nodes[node_index];
            node.error = true;
            if let Some(ctx) = workflow.ctx.as_mut() {
                ctx.error_count += 1;
                ctx.failed_node_index = node_index as u32;
            }

            match workflow.error_policy {
                ErrorPolicy::Abort => {
                    crate::kwarn!("(Workflow) política ABORT — parando workflow {}", workflow_id);
                    workflow.state = WorkflowState::Error;
                    return;
                }
                ErrorPolicy::Skip => {
                    skip_dependents(workflow);
                }
                // Continue, e Retry exausto, seguem para a varredura
                ErrorPolicy::Continue | ErrorPolicy::Retry => {}
            }
        }

        None => {
            // Sucesso: a posse do resultado entra no nó (move único)
            let node = &mut workflow.nodes[node_index];
            node.completed = true;
            node.result = result;
            node.result_size = result_size;
            if let Some(ctx) = workflow.ctx.as_mut() {
                ctx.completed_nodes += 1;
            }

            crate::ktrace!(
                "(Workflow) nó {} (evento {}) completo ({} bytes)",
                node_index,
                event_id,
                result_size
            );
        }
    }

    // A cadeia pode ter destravado nós novos
    if workflow.state == WorkflowState::Running {
        submit_ready_nodes(workflow);
    }
    check_finished(workflow);
}

// ---------------------------------------------------------------------------
// Retries agendados
// ---------------------------------------------------------------------------

/// Resubmete retries vencidos. Chamado uma vez por tick.
pub fn poll_retries(now_tick: u64) {
    // Extrair os vencidos primeiro (nunca segurar os dois locks juntos)
    let due: Vec<PendingRetry> = {
        let mut retries = RETRIES.lock();
        let mut due = Vec::new();
        let mut i = 0;
        while i < retries.len() {
            if retries[i].due_tick <= now_tick {
                due.push(retries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due
    };

    if due.is_empty() {
        return;
    }

    let mut registry = REGISTRY.lock();
    for retry in due {
        let Some(workflow) = registry
            .workflows
            .iter_mut()
            .find(|w| w.id == retry.workflow_id)
        else {
            continue;
        };
        if workflow.state != WorkflowState::Running {
            continue;
        }

        if submit_node(workflow, retry.node_index).is_none() {
            let node = &mut workflow.nodes[retry.node_index];
            node.error = true;
            node.last_error = Some(ErrorCode::SubmitFailed);
            if let Some(ctx) = workflow.ctx.as_mut() {
                ctx.error_count += 1;
            }
            check_finished(workflow);
        }
    }
}

// ---------------------------------------------------------------------------
// Monitoramento
// ---------------------------------------------------------------------------

/// Fotografia do progresso de um workflow (monitoramento e self-tests).
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub node_count: usize,
    pub completed: u32,
    pub errors: u32,
    pub node_event_ids: [u64; MAX_NODES],
    pub retry_counts: [u8; MAX_NODES],
}

/// Retira o resultado final de um workflow COMPLETO: os bytes do último
/// nó do DAG, com a posse transferida ao chamador.
pub fn take_final_result(workflow_id: u64) -> Option<(StepResult, u64)> {
    let mut registry = REGISTRY.lock();
    let workflow = registry.workflows.iter_mut().find(|w| w.id == workflow_id)?;
    if workflow.state != WorkflowState::Completed {
        return None;
    }
    let last = workflow.nodes.last_mut()?;
    let size = last.result_size;
    last.result.take().map(|result| (result, size))
}

/// Observa o estado interno de um workflow sem tocá-lo.
pub fn inspect(workflow_id: u64) -> Option<WorkflowSnapshot> {
    let registry = REGISTRY.lock();
    let workflow = registry.workflows.iter().find(|w| w.id == workflow_id)?;

    let mut node_event_ids = [0u64; MAX_NODES];
    let mut retry_counts = [0u8; MAX_NODES];
    for (i, node) in workflow.nodes.iter().enumerate() {
        node_event_ids[i] = node.event_id;
        retry_counts[i] = node.retry_count;
    }

    Some(WorkflowSnapshot {
        state: workflow.state,
        node_count: workflow.nodes.len(),
        completed: workflow
            .ctx
            .as_ref()
            .map(|c| c.completed_nodes)
            .unwrap_or(0),
        errors: workflow.ctx.as_ref().map(|c| c.error_count).unwrap_or(0),
        node_event_ids,
        retry_counts,
    })
}

// ---------------------------------------------------------------------------
// Estatísticas
// ---------------------------------------------------------------------------

/// Estatísticas do engine.
pub fn print_stats() {
    let registry = REGISTRY.lock();
    crate::kprintln!("[Workflow] registrados={}", registry.workflows.len());
    for workflow in registry.workflows.iter() {
        let (done, total, errors) = workflow
            .ctx
            .as_ref()
            .map(|c| (c.completed_nodes, c.total_nodes, c.error_count))
            .unwrap_or((0, workflow.nodes.len() as u32, 0));
        crate::kprintln!(
            "  '{}' id={} estado={:?} nós={}/{} erros={} ativações={}",
            workflow.name,
            workflow.id,
            workflow.state,
            done,
            total,
            errors,
            workflow.activation_count
        );
        if errors > 0 {
            if let Some(ctx) = workflow.ctx.as_ref() {
                if ctx.failed_node_index != u32::MAX {
                    crate::kprintln!("    primeiro nó falho: {}", ctx.failed_node_index);
                }
            }
        }
    }
}
