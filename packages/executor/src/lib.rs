pub mod container;
pub mod judge;
pub mod pool;
pub mod queue;
pub mod runtime;
pub mod sanitize;

pub use container::{ContainerError, ContainerManager, ContainerState};
pub use pool::{JobExecutor, WorkerPool, WorkerPoolOptions};
pub use sanitize::{SanitizeError, sanitize};
