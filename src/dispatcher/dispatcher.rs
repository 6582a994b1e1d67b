//! Workflow dispatcher: schedules and executes nodes over a graph.
//!
//! The dispatcher is completion-driven. Nodes whose inputs are all resolved
//! are spawned as concurrent tasks, bounded by a semaphore; each completion
//! re-scans the remaining nodes, which naturally yields execution waves of
//! mutually independent nodes. A node failure prunes only the branch that
//! depends on it; sibling branches keep running.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::{
    FlowError, Result,
    common::Vars,
    events::{ErrorReason, Event, GraphEvent, Message, NodeEvent, RunCancelledEvent, RunCompletedEvent, RunEvent, RunFailedEvent, RunStartEvent},
    graph::{Connection, ConnectionId, Graph, NodeId, NodeInstance, NodeStatus, Port},
    runtime::Context,
    utils,
    validate::validate_graph,
};

const COMPLETION_QUEUE_SIZE: usize = 1024;

/// Tuning for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum number of node executors in flight at once.
    pub max_in_flight: usize,
    /// Optional wall-clock bound applied to every executor invocation.
    pub node_timeout: Option<Duration>,
    /// Whether run-level start/terminal events are published. Nested
    /// dispatches (loop/parallel iterations) keep this off so only the
    /// outer run owns the run lifecycle.
    pub emit_run_events: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            node_timeout: None,
            emit_run_events: true,
        }
    }
}

/// Aggregated result of one dispatch.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every executed node ended success or warning.
    Completed {
        outputs: HashMap<NodeId, Vars>,
    },
    /// At least one node failed; surviving branches still report outputs.
    Failed {
        errors: Vec<(NodeId, String)>,
        outputs: HashMap<NodeId, Vars>,
    },
    /// The cancellation token fired before natural completion.
    Cancelled,
}

/// Scheduling state of a node within one dispatch.
///
/// This shadows [`NodeStatus`]: pruned nodes never leave status `idle`,
/// only their schedule state records that they will not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleState {
    Pending,
    Dispatched,
    Done,
    Pruned,
}

enum Assessment {
    Blocked,
    Eligible,
    Prune,
}

/// Executes a graph to completion against the given context.
///
/// Fails synchronously with `GraphInvalid` (no executor is invoked) when
/// the graph does not validate or references unregistered node types.
pub async fn dispatch(
    graph: Arc<Graph>,
    ctx: Arc<Context>,
    options: DispatchOptions,
) -> Result<RunOutcome> {
    validate_graph(&graph).map_err(|e| FlowError::GraphInvalid(e.to_string()))?;

    let registry = ctx.registry();
    for node in graph.nodes() {
        registry.get(&node.type_key).map_err(|e| FlowError::GraphInvalid(e.to_string()))?;
    }

    if options.emit_run_events {
        let _ = ctx.channel().event_queue().send(Event::new(&Message {
            execution_id: ctx.execution_id(),
            nid: "".to_string(),
            event: GraphEvent::Run(RunEvent::Start(RunStartEvent {
                node_ids: graph.node_ids(),
            })),
        }));
    }

    // edges closing a loop/parallel cycle are driven by the control node's
    // own executor, not by the outer dispatch
    let reentrant = find_reentrant_edges(&graph);

    let mut states: HashMap<NodeId, ScheduleState> = graph.node_ids().into_iter().map(|id| (id, ScheduleState::Pending)).collect();
    let mut errors: Vec<(NodeId, String)> = Vec::new();

    let semaphore = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
    let (tx, mut rx) = mpsc::channel::<(NodeId, NodeEvent)>(COMPLETION_QUEUE_SIZE);

    scan_and_dispatch(&graph, &ctx, &options, &reentrant, &mut states, &semaphore, &tx);

    while !is_finished(&states) {
        tokio::select! {
            _ = ctx.wait_shutdown() => {
                // in-flight nodes may finish but their results are discarded
                if options.emit_run_events {
                    let _ = ctx.channel().event_queue().send(Event::new(&Message {
                        execution_id: ctx.execution_id(),
                        nid: "".to_string(),
                        event: GraphEvent::Run(RunEvent::Cancelled(RunCancelledEvent {
                            reason: "cancelled by request".to_string(),
                        })),
                    }));
                }
                return Ok(RunOutcome::Cancelled);
            }

            Some((nid, event)) = rx.recv() => {
                let _ = ctx.channel().event_queue().send(Event::new(&Message {
                    execution_id: ctx.execution_id(),
                    nid: nid.clone(),
                    event: GraphEvent::Node(event.clone()),
                }));

                match event {
                    NodeEvent::Succeeded(outputs, _) => {
                        states.insert(nid.clone(), ScheduleState::Done);
                        set_status(&graph, &nid, NodeStatus::Success);
                        graph.record_result(&nid, outputs.clone());
                        ctx.add_output(nid.clone(), outputs);
                    }
                    NodeEvent::Warning(outputs, _) => {
                        states.insert(nid.clone(), ScheduleState::Done);
                        set_status(&graph, &nid, NodeStatus::Warning);
                        graph.record_result(&nid, outputs.clone());
                        ctx.add_output(nid.clone(), outputs);
                    }
                    NodeEvent::Error(reason) => {
                        states.insert(nid.clone(), ScheduleState::Done);
                        set_status(&graph, &nid, NodeStatus::Error);
                        let message = reason.to_string();
                        graph.record_error(&nid, message.clone());
                        ctx.add_error(nid.clone(), message.clone());
                        errors.push((nid.clone(), message));
                    }
                    NodeEvent::Stopped(_) => {
                        states.insert(nid.clone(), ScheduleState::Done);
                    }
                    _ => {}
                }

                scan_and_dispatch(&graph, &ctx, &options, &reentrant, &mut states, &semaphore, &tx);
            }
        }
    }

    let outputs = collect_outputs(&graph, &ctx);
    let outcome = if ctx.is_cancelled() {
        RunOutcome::Cancelled
    } else if errors.is_empty() {
        RunOutcome::Completed {
            outputs,
        }
    } else {
        RunOutcome::Failed {
            errors,
            outputs,
        }
    };

    if options.emit_run_events {
        let event = match &outcome {
            RunOutcome::Completed {
                outputs,
            } => RunEvent::Completed(RunCompletedEvent {
                outputs: outputs.clone(),
            }),
            RunOutcome::Failed {
                errors,
                outputs,
            } => RunEvent::Failed(RunFailedEvent {
                errors: errors.clone(),
                outputs: outputs.clone(),
            }),
            RunOutcome::Cancelled => RunEvent::Cancelled(RunCancelledEvent {
                reason: "cancelled by request".to_string(),
            }),
        };
        let _ = ctx.channel().event_queue().send(Event::new(&Message {
            execution_id: ctx.execution_id(),
            nid: "".to_string(),
            event: GraphEvent::Run(event),
        }));
    }

    Ok(outcome)
}

fn is_finished(states: &HashMap<NodeId, ScheduleState>) -> bool {
    states.values().all(|s| matches!(s, ScheduleState::Done | ScheduleState::Pruned))
}

/// Applies a status transition, surfacing rejected transitions in the log.
fn set_status(
    graph: &Graph,
    nid: &NodeId,
    status: NodeStatus,
) {
    if let Err(e) = graph.set_status(nid, status) {
        warn!(node = %nid, error = %e, "status transition rejected");
    }
}

fn collect_outputs(
    graph: &Graph,
    ctx: &Context,
) -> HashMap<NodeId, Vars> {
    graph.node_ids().into_iter().filter_map(|nid| ctx.output_of(&nid).map(|vars| (nid, vars))).collect()
}

/// Repeatedly assesses pending nodes until no more become eligible or
/// pruned, then spawns all newly eligible ones.
fn scan_and_dispatch(
    graph: &Arc<Graph>,
    ctx: &Arc<Context>,
    options: &DispatchOptions,
    reentrant: &HashSet<ConnectionId>,
    states: &mut HashMap<NodeId, ScheduleState>,
    semaphore: &Arc<Semaphore>,
    tx: &mpsc::Sender<(NodeId, NodeEvent)>,
) {
    loop {
        let pending: Vec<NodeId> = states.iter().filter(|(_, s)| **s == ScheduleState::Pending).map(|(id, _)| id.clone()).collect();

        let mut changed = false;
        for nid in pending {
            match assess(graph, ctx, reentrant, states, &nid) {
                Assessment::Blocked => {}
                Assessment::Prune => {
                    debug!(node = %nid, "pruning unreachable node");
                    states.insert(nid.clone(), ScheduleState::Pruned);
                    let _ = ctx.channel().event_queue().send(Event::new(&Message {
                        execution_id: ctx.execution_id(),
                        nid,
                        event: GraphEvent::Node(NodeEvent::Skipped),
                    }));
                    changed = true;
                }
                Assessment::Eligible => {
                    states.insert(nid.clone(), ScheduleState::Dispatched);
                    spawn_node(graph, ctx, options, reentrant, semaphore, tx, nid);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }
}

/// Decides whether a pending node can run, must wait, or will never run.
fn assess(
    graph: &Graph,
    ctx: &Context,
    reentrant: &HashSet<ConnectionId>,
    states: &HashMap<NodeId, ScheduleState>,
    nid: &NodeId,
) -> Assessment {
    let Some(node) = graph.get_node(nid) else {
        return Assessment::Prune;
    };

    let mut incoming = 0usize;
    let mut pruned_incoming = 0usize;
    let mut blocked = false;
    let mut starved = false;

    for (port, connection) in graph.inputs_of(nid) {
        let Some(connection) = connection else {
            continue;
        };
        if reentrant.contains(&connection.id) {
            continue;
        }
        incoming += 1;

        match states.get(&connection.source_node_id) {
            Some(ScheduleState::Done) => {
                if connection_value(graph, ctx, &connection).is_none() {
                    // upstream finished without emitting on this port
                    pruned_incoming += 1;
                    if port.required && config_fallback(&node, &port).is_none() {
                        starved = true;
                    }
                }
            }
            Some(ScheduleState::Pruned) => {
                pruned_incoming += 1;
                if port.required && config_fallback(&node, &port).is_none() {
                    starved = true;
                }
            }
            _ => blocked = true,
        }
    }

    if starved || (incoming > 0 && pruned_incoming == incoming) {
        Assessment::Prune
    } else if blocked {
        Assessment::Blocked
    } else {
        Assessment::Eligible
    }
}

/// Value carried by a connection, if its source emitted one.
fn connection_value(
    graph: &Graph,
    ctx: &Context,
    connection: &Connection,
) -> Option<Value> {
    let source = graph.get_node(&connection.source_node_id)?;
    let port_name = source.output_by_id(&connection.source_port_id)?.name.clone();
    ctx.output_of(&connection.source_node_id)?.get_value(&port_name).cloned()
}

/// Static fallback for an input port: config value first, declared port
/// default second.
fn config_fallback(
    node: &NodeInstance,
    port: &Port,
) -> Option<Value> {
    match node.config.get_value(&port.name) {
        Some(Value::Null) | None => port.default_value.clone(),
        Some(value) => Some(value.clone()),
    }
}

/// Resolves the input values a node runs with.
fn resolve_inputs(
    graph: &Graph,
    ctx: &Context,
    node: &NodeInstance,
    reentrant: &HashSet<ConnectionId>,
) -> std::result::Result<Vars, String> {
    let mut inputs = Vars::new();

    for (port, connection) in graph.inputs_of(&node.id) {
        let mut value = connection.filter(|c| !reentrant.contains(&c.id)).and_then(|c| connection_value(graph, ctx, &c));

        if value.is_none() {
            value = config_fallback(node, &port);
        }

        match value {
            Some(v) => inputs.insert(port.name.clone(), v),
            None if port.required => return Err(port.name.clone()),
            None => {}
        }
    }

    Ok(inputs)
}

/// Spawns a node for execution in a separate task.
fn spawn_node(
    graph: &Arc<Graph>,
    ctx: &Arc<Context>,
    options: &DispatchOptions,
    reentrant: &HashSet<ConnectionId>,
    semaphore: &Arc<Semaphore>,
    tx: &mpsc::Sender<(NodeId, NodeEvent)>,
    nid: NodeId,
) {
    let graph = graph.clone();
    let ctx = ctx.clone();
    let tx = tx.clone();
    let semaphore = semaphore.clone();
    let node_timeout = options.node_timeout;
    let reentrant = reentrant.clone();

    tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };

        let event = execute_node(&graph, &ctx, &reentrant, node_timeout, &nid).await;
        let _ = tx.send((nid, event)).await;
    });
}

/// Executes a single node, including input resolution, the cancellation
/// check, and the optional timeout.
async fn execute_node(
    graph: &Arc<Graph>,
    ctx: &Arc<Context>,
    reentrant: &HashSet<ConnectionId>,
    node_timeout: Option<Duration>,
    nid: &NodeId,
) -> NodeEvent {
    if ctx.is_cancelled() {
        return NodeEvent::Stopped(utils::time::time_millis());
    }

    let Some(node) = graph.get_node(nid) else {
        return NodeEvent::Error(ErrorReason::Failed(format!("node {} not found", nid)));
    };

    let executor = match ctx.registry().get(&node.type_key) {
        Ok(definition) => definition.executor.clone(),
        Err(e) => return NodeEvent::Error(ErrorReason::Failed(e.to_string())),
    };

    let inputs = match resolve_inputs(graph, ctx, &node, reentrant) {
        Ok(inputs) => inputs,
        Err(port) => return NodeEvent::Error(ErrorReason::MissingInput(port)),
    };

    let start_time = utils::time::time_millis();
    set_status(graph, nid, NodeStatus::Running);
    let _ = ctx.channel().event_queue().send(Event::new(&Message {
        execution_id: ctx.execution_id(),
        nid: nid.clone(),
        event: GraphEvent::Node(NodeEvent::Running(start_time)),
    }));
    debug!(node = %nid, r#type = %node.type_key, "executing node");

    let run_future = async {
        if let Some(timeout) = node_timeout {
            match tokio::time::timeout(timeout, executor.run(&node, &inputs, ctx.clone())).await {
                Ok(result) => result,
                Err(_) => Err(FlowError::Executor {
                    node: nid.clone(),
                    cause: "timeout".to_string(),
                }),
            }
        } else {
            executor.run(&node, &inputs, ctx.clone()).await
        }
    };

    let result = tokio::select! {
        _ = ctx.wait_shutdown() => return NodeEvent::Stopped(utils::time::time_millis()),
        result = run_future => result,
    };

    let end_time = utils::time::time_millis();
    match result {
        Ok(output) => match output.status {
            NodeStatus::Warning => NodeEvent::Warning(output.outputs, end_time),
            _ => NodeEvent::Succeeded(output.outputs, end_time),
        },
        Err(FlowError::Executor {
            cause,
            ..
        }) if cause == "timeout" => NodeEvent::Error(ErrorReason::Timeout),
        Err(e) => NodeEvent::Error(ErrorReason::Failed(e.to_string())),
    }
}

/// Finds connection ids that close a cycle through loop/parallel nodes.
///
/// Graph validation already guarantees every cycle passes through such a
/// node; the closing edges are driven by the control node's executor and
/// are invisible to wave scheduling.
fn find_reentrant_edges(graph: &Graph) -> HashSet<ConnectionId> {
    let mut adjacency: HashMap<NodeId, Vec<Connection>> = HashMap::new();
    for conn in graph.connections() {
        adjacency.entry(conn.source_node_id.clone()).or_default().push(conn);
    }

    let mut reentrant = HashSet::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut on_stack: HashSet<NodeId> = HashSet::new();

    fn visit(
        id: &NodeId,
        adjacency: &HashMap<NodeId, Vec<Connection>>,
        visited: &mut HashSet<NodeId>,
        on_stack: &mut HashSet<NodeId>,
        reentrant: &mut HashSet<ConnectionId>,
    ) {
        visited.insert(id.clone());
        on_stack.insert(id.clone());

        for conn in adjacency.get(id).into_iter().flatten() {
            if on_stack.contains(&conn.target_node_id) {
                reentrant.insert(conn.id.clone());
            } else if !visited.contains(&conn.target_node_id) {
                visit(&conn.target_node_id, adjacency, visited, on_stack, reentrant);
            }
        }

        on_stack.remove(id);
    }

    for nid in graph.node_ids() {
        if !visited.contains(&nid) {
            visit(&nid, &adjacency, &mut visited, &mut on_stack, &mut reentrant);
        }
    }

    reentrant
}
