mod connection;
mod node;
mod workflow;

pub use connection::ConnectionModel;
pub use node::{NodeModel, PortModel};
pub use workflow::{DocumentMetadata, WorkflowDocument};
