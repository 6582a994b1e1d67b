//! A single execution of a workflow.
//!
//! A [`Run`] owns a deep copy of the graph, a fresh execution context, and
//! the driver task that feeds the dispatcher. The editable graph is never
//! touched by a run; statuses and results accumulate on the copy.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::{
    common::{Queue, Shutdown, Vars},
    dispatcher::{DispatchOptions, RunOutcome, dispatch},
    graph::{Graph, NodeId},
    registry::TypeRegistry,
    runtime::{Channel, Context},
    utils,
};

pub type ExecutionId = String;

const COMMAND_QUEUE_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub enum RunCommand {
    Start,
    Cancel,
}

/// Handle to one workflow execution.
pub struct Run {
    id: ExecutionId,
    graph: Arc<Graph>,
    ctx: Arc<Context>,
    command_queue: Arc<Queue<RunCommand>>,
    handle: Handle,
    options: DispatchOptions,
    done: Arc<Shutdown>,
}

impl Run {
    /// Prepares a run over a private copy of the graph.
    ///
    /// Initial variables (typically the document's metadata variables) seed
    /// the context before any node executes.
    pub fn new(
        graph: &Graph,
        registry: Arc<TypeRegistry>,
        channel: Arc<Channel>,
        handle: Handle,
        options: DispatchOptions,
        initial_variables: HashMap<String, Value>,
    ) -> Arc<Self> {
        let id = utils::longid();
        let graph = Arc::new(graph.deep_clone());
        graph.reset_runtime();

        let ctx = Arc::new(Context::new(&graph.id, id.clone(), registry, channel));
        for (key, value) in initial_variables {
            ctx.set_variable(&key, value);
        }

        Arc::new(Self {
            id,
            graph,
            ctx,
            command_queue: Queue::new(COMMAND_QUEUE_SIZE),
            handle,
            options,
            done: Arc::new(Shutdown::new()),
        })
    }

    pub fn id(&self) -> ExecutionId {
        self.id.clone()
    }

    pub fn workflow_id(&self) -> &str {
        &self.graph.id
    }

    /// The run's private graph copy, carrying live statuses and results.
    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    pub fn context(&self) -> Arc<Context> {
        self.ctx.clone()
    }

    /// Spawns the driver task and queues the start command.
    pub fn start(self: &Arc<Self>) {
        let run = self.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = run.done.wait() => break,
                    Some(command) = run.command_queue.next_async() => match command {
                        RunCommand::Start => {
                            let graph = run.graph.clone();
                            let ctx = run.ctx.clone();
                            let options = run.options.clone();
                            let done = run.done.clone();
                            let execution_id = run.id.clone();

                            tokio::spawn(async move {
                                match dispatch(graph, ctx, options).await {
                                    Ok(outcome) => debug!(execution_id = %execution_id, outcome = outcome_str(&outcome), "run finished"),
                                    Err(e) => error!(execution_id = %execution_id, error = %e, "run refused"),
                                }
                                done.shutdown();
                            });
                        }
                        RunCommand::Cancel => run.ctx.cancel(),
                    },
                }
            }
        });

        if let Err(e) = self.command_queue.send(RunCommand::Start) {
            error!(execution_id = %self.id, error = %e, "failed to queue start command");
        }
    }

    /// Requests cancellation. Nodes not yet started stay idle; nodes in
    /// flight are allowed to finish but their results are discarded.
    pub fn cancel(&self) {
        if let Err(e) = self.command_queue.send(RunCommand::Cancel) {
            error!(execution_id = %self.id, error = %e, "failed to queue cancel command");
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done.is_terminated()
    }

    /// Waits until the run reaches a terminal state.
    pub async fn wait(&self) {
        self.done.wait().await;
    }

    /// Outputs emitted so far, keyed by node id.
    pub fn outputs(&self) -> HashMap<NodeId, Vars> {
        self.graph.node_ids().into_iter().filter_map(|nid| self.ctx.output_of(&nid).map(|vars| (nid, vars))).collect()
    }

    /// Node errors collected so far.
    pub fn errors(&self) -> Vec<(NodeId, String)> {
        self.ctx.errors()
    }
}

fn outcome_str(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed {
            ..
        } => "completed",
        RunOutcome::Failed {
            ..
        } => "failed",
        RunOutcome::Cancelled => "cancelled",
    }
}
