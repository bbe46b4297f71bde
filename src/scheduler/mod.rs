//! Data-driven ready-set scheduler.
//!
//! A single coordinator task dispatches ready vertices to a bounded worker
//! pool and reacts to completions. Readiness is driven by edge deliveries,
//! not a topological walk, so `loop` back-edges can re-admit their vertex on
//! every delivery.

pub mod record;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use petgraph::stable_graph::EdgeIndex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::{EngineError, NodeError};
use crate::events::ExecutionEvent;
use crate::graph::{Graph, NodeKind, Port};
use crate::nodes::{
    ExecutionFrame, NodeExecutorRegistry, OperatorOutput, OperatorServices, PortSelection,
};

pub use record::{ExecutionRecord, NodeStatus};

/// Delivery state of one edge for the current execution wave of its source.
#[derive(Debug, Clone, PartialEq)]
enum EdgeState {
    Pending,
    Delivered(String),
    Disabled,
}

/// One end-to-end run of one graph: records, worker pool, event stream.
pub struct ExecutionSession {
    graph: Arc<Graph>,
    registry: Arc<NodeExecutorRegistry>,
    services: OperatorServices,
    records: Arc<RwLock<HashMap<String, ExecutionRecord>>>,
    worker_cap: usize,
}

type WorkerResult = (String, Result<OperatorOutput, NodeError>);

impl ExecutionSession {
    pub fn new(
        graph: Graph,
        registry: Arc<NodeExecutorRegistry>,
        services: OperatorServices,
        worker_cap: usize,
    ) -> Self {
        let records = graph
            .node_ids()
            .map(|id| (id.to_string(), ExecutionRecord::default()))
            .collect();
        ExecutionSession {
            graph: Arc::new(graph),
            registry,
            services,
            records: Arc::new(RwLock::new(records)),
            worker_cap: worker_cap.max(1),
        }
    }

    /// Snapshot of the record table.
    pub fn records(&self) -> HashMap<String, ExecutionRecord> {
        self.records.read().clone()
    }

    pub fn record(&self, id: &str) -> Option<ExecutionRecord> {
        self.records.read().get(id).cloned()
    }

    /// Drive the graph to completion. Emits `execution_complete` or
    /// `execution_error` as the final event of the run.
    pub async fn run(&self) -> Result<(), EngineError> {
        let mut edge_states: HashMap<EdgeIndex, EdgeState> = self
            .graph
            .inner
            .edge_indices()
            .map(|e| (e, EdgeState::Pending))
            .collect();
        let mut ready: VecDeque<String> = VecDeque::new();
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.worker_cap));

        for id in self.graph.source_ids() {
            self.admit(&id, &mut ready);
        }

        let outcome = self
            .drive(&mut edge_states, &mut ready, &mut workers, &semaphore)
            .await;

        match outcome {
            Ok(()) if self.services.cancel.is_cancelled() => {
                self.skip_unstarted();
                self.services.events.emit(ExecutionEvent::ExecutionError {
                    error: "cancelled".into(),
                });
                Err(EngineError::Cancelled)
            }
            Ok(()) => {
                if let Some(stuck) = self.first_non_terminal() {
                    error!(node_id = %stuck, "Vertex never reached a terminal state");
                    self.services.events.emit(ExecutionEvent::ExecutionError {
                        error: "scheduler-stuck".into(),
                    });
                    return Err(EngineError::SchedulerStuck(format!(
                        "vertex '{}' never reached a terminal state",
                        stuck
                    )));
                }
                self.services.events.emit(ExecutionEvent::ExecutionComplete);
                Ok(())
            }
            Err(e) => {
                self.services.cancel.cancel();
                while workers.join_next().await.is_some() {}
                self.services.events.emit(ExecutionEvent::ExecutionError {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        ready: &mut VecDeque<String>,
        workers: &mut JoinSet<WorkerResult>,
        semaphore: &Arc<Semaphore>,
    ) -> Result<(), EngineError> {
        while !ready.is_empty() || !workers.is_empty() {
            if self.services.cancel.is_cancelled() {
                ready.clear();
                // Await in-flight workers; cancellation bounds their exit.
                while let Some(joined) = workers.join_next().await {
                    if let Ok((id, result)) = joined {
                        self.finish_record(&id, &result);
                    }
                }
                return Ok(());
            }

            while workers.len() < self.worker_cap {
                let Some(id) = ready.pop_front() else { break };
                self.dispatch(&id, edge_states, workers, semaphore).await?;
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let (id, result) = joined.map_err(|e| {
                EngineError::Internal(format!("worker panicked: {}", e))
            })?;
            match result {
                Ok(output) => self.complete_success(&id, output, edge_states, ready),
                Err(e) => self.complete_failure(&id, &e, edge_states, ready),
            }
        }
        Ok(())
    }

    fn admit(&self, id: &str, ready: &mut VecDeque<String>) {
        let mut records = self.records.write();
        let record = records.entry(id.to_string()).or_default();
        if matches!(record.status, NodeStatus::Ready | NodeStatus::Running) {
            return;
        }
        record.status = NodeStatus::Ready;
        ready.push_back(id.to_string());
    }

    async fn dispatch(
        &self,
        id: &str,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        workers: &mut JoinSet<WorkerResult>,
        semaphore: &Arc<Semaphore>,
    ) -> Result<(), EngineError> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| EngineError::Internal(format!("dispatched unknown vertex '{}'", id)))?
            .clone();

        let iteration = {
            let mut records = self.records.write();
            let record = records.entry(id.to_string()).or_default();
            record.status = NodeStatus::Running;
            record.iterations
        };
        let payload = match node.kind {
            NodeKind::Input => String::new(),
            NodeKind::Loop if iteration > 0 => self
                .records
                .read()
                .get(id)
                .and_then(|r| r.last_back_payload.clone())
                .unwrap_or_default(),
            _ => self.assemble_payload(id, &node.kind, edge_states),
        };

        // A re-executed vertex gets a fresh outgoing wave.
        for edge in self.graph.outbound_edges(id) {
            edge_states.insert(edge, EdgeState::Pending);
        }

        debug!(node_id = %id, kind = node.kind.as_str(), iteration, "Dispatching vertex");
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let frame = ExecutionFrame {
            node,
            payload,
            iteration,
        };
        let services = self.services.clone();
        let registry = self.registry.clone();
        let records = self.records.clone();
        let id = id.to_string();
        workers.spawn(async move {
            let _permit = permit;
            services.events.node_start(&id);
            let result = match registry.get(frame.node.kind) {
                Some(executor) => executor.execute(&frame, &services).await,
                None => Err(NodeError::ConfigError(format!(
                    "no executor registered for kind '{}'",
                    frame.node.kind.as_str()
                ))),
            };
            match &result {
                Ok(output) => {
                    {
                        let mut records = records.write();
                        if let Some(record) = records.get_mut(&id) {
                            record.output = output.text.clone();
                            record.usage = output.usage;
                        }
                    }
                    if let Some(usage) = output.usage {
                        services.events.node_usage(&id, usage);
                    }
                    services.events.node_finish(&id, &output.text);
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, kind = e.kind(), "Vertex failed");
                    services.events.node_failed(&id, &e.to_string(), e.kind());
                }
            }
            (id, result)
        });
        Ok(())
    }

    /// Concatenate delivered predecessor outputs, source ids ascending,
    /// separated by blank lines. Loop vertices ignore their back-edges here.
    fn assemble_payload(
        &self,
        id: &str,
        kind: &NodeKind,
        edge_states: &HashMap<EdgeIndex, EdgeState>,
    ) -> String {
        let mut parts: Vec<(String, String, String)> = Vec::new();
        for edge in self.graph.inbound_edges(id) {
            if *kind == NodeKind::Loop && self.graph.is_back_edge(edge) {
                continue;
            }
            if let Some(EdgeState::Delivered(payload)) = edge_states.get(&edge) {
                let weight = self.graph.edge(edge);
                parts.push((weight.source.clone(), weight.id.clone(), payload.clone()));
            }
        }
        parts.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        parts
            .into_iter()
            .map(|(_, _, payload)| payload)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn finish_record(&self, id: &str, result: &Result<OperatorOutput, NodeError>) {
        let mut records = self.records.write();
        let record = records.entry(id.to_string()).or_default();
        record.status = if result.is_ok() {
            NodeStatus::Success
        } else {
            NodeStatus::Failed
        };
    }

    fn complete_success(
        &self,
        id: &str,
        output: OperatorOutput,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        ready: &mut VecDeque<String>,
    ) {
        {
            let mut records = self.records.write();
            records.entry(id.to_string()).or_default().status = NodeStatus::Success;
        }
        let node = self.graph.node(id).expect("completed vertex exists");
        let is_loop = node.kind == NodeKind::Loop;
        let iterating = output.port == PortSelection::Named(Port::Loop);

        let mut touched: Vec<String> = Vec::new();
        for edge in self.graph.outbound_edges(id) {
            let weight = self.graph.edge(edge).clone();
            let enabled = match (&output.port, weight.source_port) {
                (PortSelection::Unnamed, None) => true,
                (PortSelection::Named(p), Some(q)) => *p == q,
                _ => false,
            };
            if enabled {
                edge_states.insert(edge, EdgeState::Delivered(output.text.clone()));
                if self.graph.is_back_edge(edge) {
                    // Per-delivery readiness: each back-edge delivery
                    // re-executes the loop with an incremented counter.
                    {
                        let mut records = self.records.write();
                        let record = records.entry(weight.target.clone()).or_default();
                        record.iterations += 1;
                        record.last_back_payload = Some(output.text.clone());
                    }
                    self.admit(&weight.target, ready);
                } else {
                    touched.push(weight.target);
                }
            } else if is_loop && iterating {
                // The done port stays pending while the loop may still
                // re-execute; a later delivery decides it.
            } else if is_loop {
                // Exiting: the loop-port edges already carried their
                // deliveries in earlier waves, leave them untouched.
            } else {
                self.disable_edge(edge, edge_states, &mut touched);
            }
        }
        self.propagate(touched, edge_states, ready);
    }

    fn complete_failure(
        &self,
        id: &str,
        error: &NodeError,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        ready: &mut VecDeque<String>,
    ) {
        debug!(node_id = %id, error = %error, "Propagating failure as skips");
        {
            let mut records = self.records.write();
            records.entry(id.to_string()).or_default().status = NodeStatus::Failed;
        }
        let mut touched: Vec<String> = Vec::new();
        for edge in self.graph.outbound_edges(id) {
            self.disable_edge(edge, edge_states, &mut touched);
        }
        self.propagate(touched, edge_states, ready);
    }

    /// Disable an edge and, when it was the last live back-edge of a loop,
    /// cascade the disable to the loop's still-pending outgoing edges: the
    /// iteration can never resume, so its exit successors must resolve.
    fn disable_edge(
        &self,
        edge: EdgeIndex,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        touched: &mut Vec<String>,
    ) {
        edge_states.insert(edge, EdgeState::Disabled);
        let weight = self.graph.edge(edge).clone();
        if self.graph.is_back_edge(edge) {
            let all_back_dead = self
                .graph
                .inbound_edges(&weight.target)
                .into_iter()
                .filter(|e| self.graph.is_back_edge(*e))
                .all(|e| edge_states.get(&e) == Some(&EdgeState::Disabled));
            let loop_idle = self
                .records
                .read()
                .get(&weight.target)
                .map(|r| r.status.is_terminal())
                .unwrap_or(false);
            if all_back_dead && loop_idle {
                for out in self.graph.outbound_edges(&weight.target) {
                    if edge_states.get(&out) == Some(&EdgeState::Pending) {
                        self.disable_edge(out, edge_states, touched);
                    }
                }
            }
        } else {
            touched.push(weight.target);
        }
    }

    /// Re-evaluate vertices whose inbound edges changed; admissions from one
    /// wave are ordered by vertex id ascending.
    fn propagate(
        &self,
        seeds: Vec<String>,
        edge_states: &mut HashMap<EdgeIndex, EdgeState>,
        ready: &mut VecDeque<String>,
    ) {
        let mut queue: VecDeque<String> = seeds.into();
        let mut to_admit: Vec<String> = Vec::new();
        while let Some(id) = queue.pop_front() {
            let status = self
                .records
                .read()
                .get(&id)
                .map(|r| r.status)
                .unwrap_or_default();
            if matches!(status, NodeStatus::Ready | NodeStatus::Running) {
                continue;
            }
            let node = self.graph.node(&id).expect("propagated vertex exists");

            let mut delivered = 0usize;
            let mut unresolved = false;
            for edge in self.graph.inbound_edges(&id) {
                if node.kind == NodeKind::Loop && self.graph.is_back_edge(edge) {
                    continue;
                }
                match edge_states.get(&edge) {
                    Some(EdgeState::Delivered(_)) => delivered += 1,
                    Some(EdgeState::Disabled) => {}
                    _ => {
                        unresolved = true;
                        break;
                    }
                }
            }
            if unresolved {
                continue;
            }

            if delivered > 0 {
                if node.kind == NodeKind::Loop {
                    // A fresh forward delivery to a finished loop starts a
                    // new iteration instance with a zeroed counter.
                    let mut records = self.records.write();
                    let record = records.entry(id.clone()).or_default();
                    if record.status.is_terminal() {
                        record.iterations = 0;
                        record.last_back_payload = None;
                    }
                }
                if !to_admit.contains(&id) {
                    to_admit.push(id);
                }
            } else if status != NodeStatus::Skipped {
                // Every inbound edge disabled: conservative skip.
                {
                    let mut records = self.records.write();
                    records.entry(id.clone()).or_default().status = NodeStatus::Skipped;
                }
                self.services.events.node_skipped(&id);
                let mut touched: Vec<String> = Vec::new();
                for edge in self.graph.outbound_edges(&id) {
                    self.disable_edge(edge, edge_states, &mut touched);
                }
                queue.extend(touched);
            }
        }

        to_admit.sort();
        for id in to_admit {
            self.admit(&id, ready);
        }
    }

    /// Synthesize `node_skipped` for work that never started before
    /// cancellation.
    fn skip_unstarted(&self) {
        let unstarted: Vec<String> = {
            let records = self.records.read();
            records
                .iter()
                .filter(|(_, r)| matches!(r.status, NodeStatus::Pending | NodeStatus::Ready))
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut records = self.records.write();
        for id in unstarted {
            records.entry(id.clone()).or_default().status = NodeStatus::Skipped;
            self.services.events.node_skipped(&id);
        }
    }

    fn first_non_terminal(&self) -> Option<String> {
        let records = self.records.read();
        let mut ids: Vec<&String> = records
            .iter()
            .filter(|(_, r)| !r.status.is_terminal())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids.first().map(|s| s.to_string())
    }
}
