mod data;
mod graph;
mod regent;
mod schema;

pub use data::DataError;
pub use graph::GraphError;
pub use regent::{HookError, RegentError};
pub use schema::SchemaError;

/// Decides whether an error aborts a whole load pass or only the module that raised it.
pub trait IsFatal {
    fn is_fatal(&self) -> bool;
}
