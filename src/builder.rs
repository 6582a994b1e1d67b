use std::{sync::Arc, time::Duration};

use tokio::runtime::{Builder, Runtime};

use crate::{
    Engine, Result,
    dispatcher::DispatchOptions,
    nodes,
    registry::TypeRegistry,
};

pub struct EngineBuilder {
    async_worker_thread_number: u16,
    max_in_flight_nodes: usize,
    node_timeout: Option<Duration>,
    registry: Option<TypeRegistry>,
    rt: Option<Arc<Runtime>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            async_worker_thread_number: 16,
            max_in_flight_nodes: 8,
            node_timeout: None,
            registry: None,
            rt: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.async_worker_thread_number = n;
        self
    }

    pub fn max_in_flight_nodes(
        mut self,
        n: usize,
    ) -> Self {
        self.max_in_flight_nodes = n;
        self
    }

    pub fn node_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    /// Replaces the default registry of built-in node types.
    pub fn registry(
        mut self,
        registry: TypeRegistry,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let runtime = if self.rt.is_some() {
            self.rt.as_ref().unwrap().clone()
        } else {
            Arc::new(Builder::new_multi_thread().worker_threads(self.async_worker_thread_number.into()).enable_all().build().unwrap())
        };
        let registry = Arc::new(self.registry.clone().unwrap_or_else(nodes::builtin_registry));
        let options = DispatchOptions {
            max_in_flight: self.max_in_flight_nodes,
            node_timeout: self.node_timeout,
            emit_run_events: true,
        };

        Ok(Engine::new(runtime, registry, options))
    }
}
