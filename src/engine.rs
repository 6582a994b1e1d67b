//! Workflow engine - the main entry point.
//!
//! The engine owns the node type registry, the event channel, and the
//! tokio runtime runs execute on. It tracks active runs, cleans them up on
//! completion, and coordinates graceful shutdown.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::{
    ChannelEvent, ChannelOptions, Config, FlowError, Result,
    common::{MemCache, Queue, Shutdown},
    dispatcher::DispatchOptions,
    graph::Graph,
    model::WorkflowDocument,
    nodes,
    registry::TypeRegistry,
    runtime::{Channel, ExecutionId, Run},
    validate::validate_graph,
};

/// Maximum number of runs to cache in memory.
const RUN_CACHE_SIZE: usize = 2048;
/// Size of the queue for completed run notifications.
const RUN_COMPLETE_QUEUE_SIZE: usize = 100;
/// How long a finished run stays fetchable before it is dropped from the
/// cache. Callers read outputs through `get_run` after the terminal event.
const RUN_RETENTION: std::time::Duration = std::time::Duration::from_secs(300);

/// The main workflow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// let execution_id = engine.start_run(&document)?;
/// engine.subscribe(ChannelOptions::with_execution_id(execution_id.clone())).on_terminal(|id| {
///     println!("run {} finished", id);
/// });
///
/// engine.shutdown();
/// ```
pub struct Engine {
    /// Registry of node type definitions runs resolve executors from.
    registry: Arc<TypeRegistry>,
    /// Event channel for broadcasting run events.
    channel: Arc<Channel>,
    /// Queue for receiving run completion notifications.
    runs_complete_queue: Arc<Queue<ExecutionId>>,
    /// In-memory cache of active runs.
    runs: Arc<MemCache<ExecutionId, Arc<Run>>>,
    /// Scheduling options applied to every run.
    options: DispatchOptions,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Arc<Runtime>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub fn new(
        runtime: Arc<Runtime>,
        registry: Arc<TypeRegistry>,
        options: DispatchOptions,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.handle().clone()));

        Self {
            registry,
            channel,
            runs_complete_queue: Queue::new(RUN_COMPLETE_QUEUE_SIZE),
            runs: Arc::new(MemCache::new(RUN_CACHE_SIZE)),
            options,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Creates a new engine with the given configuration and the built-in
    /// node types.
    pub fn new_with_config(config: Config) -> Self {
        let runtime = Arc::new(Builder::new_multi_thread().worker_threads(config.async_worker_thread_number.into()).enable_all().build().unwrap());
        let options = DispatchOptions {
            max_in_flight: config.max_in_flight_nodes,
            node_timeout: config.node_timeout_ms.map(std::time::Duration::from_millis),
            emit_run_events: true,
        };

        Self::new(runtime, Arc::new(nodes::builtin_registry()), options)
    }

    /// Starts the engine and begins processing events.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        // Register handlers first, then start listening
        // This ensures no events are missed
        let runs_complete_queue = self.runs_complete_queue.clone();
        ChannelEvent::channel(self.channel.clone(), ChannelOptions::default()).on_terminal(move |execution_id| {
            let _ = runs_complete_queue.send(execution_id);
        });
        self.channel.listen();

        // Drop finished runs from the cache after the retention window
        let runs_complete_queue = self.runs_complete_queue.clone();
        let shutdown = self.shutdown.clone();
        let runs = self.runs.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(execution_id) = runs_complete_queue.next_async() => {
                        let runs = runs.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(RUN_RETENTION).await;
                            runs.remove(&execution_id);
                        });
                    }
                }
            }
        });
    }

    /// Gracefully shuts down the engine, cancelling active runs.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        for (_, run) in self.runs.iter() {
            run.cancel();
        }
        self.channel.shutdown();
    }

    /// Starts a run from an interchange document.
    ///
    /// The document's metadata variables seed the run context. Returns the
    /// execution id once the run is scheduled.
    pub fn start_run(
        &self,
        document: &WorkflowDocument,
    ) -> Result<ExecutionId> {
        let graph = document.to_graph(&self.registry)?;
        self.start_run_graph(&graph, document.metadata.variables.clone())
    }

    /// Starts a run directly from a graph.
    ///
    /// Refuses synchronously with `GraphInvalid` when the graph does not
    /// validate or references unregistered node types; no node executes.
    pub fn start_run_graph(
        &self,
        graph: &Graph,
        variables: HashMap<String, Value>,
    ) -> Result<ExecutionId> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(FlowError::Engine("Engine is not running".to_string()));
        }

        validate_graph(graph).map_err(|e| FlowError::GraphInvalid(e.to_string()))?;
        for node in graph.nodes() {
            self.registry.get(&node.type_key).map_err(|e| FlowError::GraphInvalid(e.to_string()))?;
        }

        let run = Run::new(graph, self.registry.clone(), self.channel.clone(), self.runtime.handle().clone(), self.options.clone(), variables);
        let execution_id = run.id();

        // Add the run to the cache first (before starting)
        self.runs.set(execution_id.clone(), run.clone());
        run.start();

        Ok(execution_id)
    }

    /// Cancels a running execution by its id.
    pub fn cancel_run(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<()> {
        match self.runs.get(execution_id) {
            Some(run) => {
                run.cancel();
                Ok(())
            }
            None => Err(FlowError::Engine(format!("Run {} not found", execution_id))),
        }
    }

    /// Gets an active run by its id.
    pub fn get_run(
        &self,
        execution_id: &ExecutionId,
    ) -> Option<Arc<Run>> {
        self.runs.get(execution_id)
    }

    /// Subscribes to run and node events, filtered by the given options.
    pub fn subscribe(
        &self,
        options: ChannelOptions,
    ) -> ChannelEvent {
        ChannelEvent::channel(self.channel.clone(), options)
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Returns the node type registry.
    pub fn registry(&self) -> Arc<TypeRegistry> {
        self.registry.clone()
    }
}
