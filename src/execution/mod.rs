//! Plan execution. The engine runs a plan's operations on the calling
//! thread and on scoped worker threads, sharing a test result, barriers and
//! a cancellation flag between them via the execution context.

mod barrier;
mod context;
mod engine;
mod pool;
mod result;

pub use barrier::{Barrier, BarrierWait};
pub use context::{AbortHandle, ExecutionContext, SharedConnection, DEFAULT_CONNECTION};
pub use engine::Engine;
pub use pool::ThreadPool;
pub use result::{Annotation, Failure, Report, Status, TestResult};
