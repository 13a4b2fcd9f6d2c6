//! A Tokio-based admission gate that caps how many tasks run at once.
//!
//! Tasks can be run in place (`do_task`), opportunistically (`try_do`),
//! detached (`do_async`), or detached with a cancelable admission wait
//! (`do_async_context`). Closing the gate rejects new work while letting
//! in-flight tasks finish.

mod context;
mod error;
mod gate;
mod permit;
mod task;

pub use context::AdmissionContext;
pub use error::{CancelCause, GateError};
pub use gate::WorkGate;
pub use permit::GatePermit;
pub use task::ErrorHandler;
