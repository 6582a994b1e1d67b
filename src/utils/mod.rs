pub mod time;

/// Generates a short unique id for nodes, ports, and connections.
pub fn shortid() -> String {
    nanoid::nanoid!(10)
}

/// Generates a long unique id for runs.
pub fn longid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
