//! Per-run execution context.
//!
//! One context is created for each run and passed to every executor
//! invocation. It carries the shared variables map, per-node emitted
//! outputs, collected errors, the event/log channel, and the cancellation
//! signal. The variables map is the only state shared across concurrently
//! running nodes; the lock serializes its writers.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    ShareLock,
    common::{Shutdown, Vars},
    events::{Event, Log},
    graph::NodeId,
    registry::TypeRegistry,
    runtime::{Channel, ExecutionId},
    utils,
};

// Variables and outputs are run state, not caches: every entry written
// during a run must stay readable until the run ends, however large the
// graph is.
#[derive(Clone)]
pub struct Context {
    workflow_id: String,
    execution_id: ExecutionId,
    registry: Arc<TypeRegistry>,
    variables: ShareLock<HashMap<String, Value>>,
    outputs: ShareLock<HashMap<NodeId, Vars>>,
    errors: ShareLock<Vec<(NodeId, String)>>,
    channel: Arc<Channel>,

    shutdown: Arc<Shutdown>,
}

impl Context {
    pub fn new(
        workflow_id: &str,
        execution_id: ExecutionId,
        registry: Arc<TypeRegistry>,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            execution_id,
            registry,
            variables: ShareLock::new(HashMap::new().into()),
            outputs: ShareLock::new(HashMap::new().into()),
            errors: ShareLock::new(Vec::new().into()),
            channel,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Context for a nested dispatch (loop/parallel iteration).
    ///
    /// Shares the parent's variables, errors, channel, and cancellation
    /// signal, but isolates emitted outputs so iterations do not observe
    /// each other's values.
    pub fn child(&self) -> Self {
        Self {
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
            registry: self.registry.clone(),
            variables: self.variables.clone(),
            outputs: ShareLock::new(HashMap::new().into()),
            errors: self.errors.clone(),
            channel: self.channel.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Like [`Context::child`], but with a private snapshot of the
    /// variables map. Concurrent iterations write their item variables
    /// without racing each other; writes do not propagate to the parent.
    pub fn child_isolated(&self) -> Self {
        let snapshot = self.variables.read().unwrap().clone();

        let mut child = self.child();
        child.variables = ShareLock::new(snapshot.into());
        child
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id.to_owned()
    }

    pub fn registry(&self) -> Arc<TypeRegistry> {
        self.registry.clone()
    }

    pub fn set_variable(
        &self,
        key: &str,
        value: Value,
    ) {
        self.variables.write().unwrap().insert(key.to_string(), value);
    }

    pub fn get_variable(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.variables.read().unwrap().get(key).cloned()
    }

    /// Outputs emitted by one node, if it has finished and emitted any.
    pub fn output_of(
        &self,
        nid: &NodeId,
    ) -> Option<Vars> {
        self.outputs.read().unwrap().get(nid).cloned()
    }

    pub fn add_output(
        &self,
        nid: NodeId,
        outputs: Vars,
    ) {
        self.outputs.write().unwrap().insert(nid, outputs);
    }

    pub fn add_error(
        &self,
        nid: NodeId,
        message: String,
    ) {
        self.errors.write().unwrap().push((nid, message));
    }

    pub fn errors(&self) -> Vec<(NodeId, String)> {
        self.errors.read().unwrap().clone()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn emit_log(
        &self,
        nid: NodeId,
        content: String,
    ) {
        let log = Log {
            execution_id: self.execution_id.clone(),
            nid,
            content,
            timestamp: utils::time::time_millis(),
        };
        let _ = self.channel.log_queue().send(Event::new(&log));
    }

    /// Signals run cancellation; checked before every node start and
    /// honored cooperatively inside long-running executors.
    pub fn cancel(&self) {
        self.shutdown.shutdown();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_terminated()
    }

    pub fn wait_shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shutdown.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes;

    fn context() -> Context {
        let registry = Arc::new(nodes::builtin_registry());
        let channel = Arc::new(Channel::new(tokio::runtime::Handle::current()));
        Context::new("wf-test", utils::longid(), registry, channel)
    }

    #[tokio::test]
    async fn test_large_runs_keep_every_entry() {
        let ctx = context();
        for i in 0..2000i64 {
            ctx.set_variable(&format!("var_{}", i), Value::from(i));
            ctx.add_output(format!("node_{}", i), Vars::new().with("out", i));
        }

        for i in 0..2000i64 {
            assert_eq!(ctx.get_variable(&format!("var_{}", i)), Some(Value::from(i)));
            assert_eq!(ctx.output_of(&format!("node_{}", i)).unwrap().get::<i64>("out"), Some(i));
        }
    }

    #[tokio::test]
    async fn test_isolated_child_does_not_leak_writes() {
        let ctx = context();
        ctx.set_variable("shared", Value::from("base"));

        let child = ctx.child_isolated();
        assert_eq!(child.get_variable("shared"), Some(Value::from("base")));
        child.set_variable("shared", Value::from("mine"));

        assert_eq!(ctx.get_variable("shared"), Some(Value::from("base")));
    }
}
