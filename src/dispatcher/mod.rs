mod dispatcher;

pub use dispatcher::{DispatchOptions, RunOutcome, dispatch};
