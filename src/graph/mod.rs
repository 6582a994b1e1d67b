pub mod connection;
pub mod node;
pub mod port;
mod workflow;

pub use connection::{Connection, ConnectionId};
pub use node::{NodeId, NodeInstance, NodeStatus, Position};
pub use port::{DataType, Port, PortId};
pub use workflow::Graph;
