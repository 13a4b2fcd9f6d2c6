use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Why an admission wait was abandoned by its `AdmissionContext`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
  #[error("context canceled")]
  Cancelled,

  #[error("context deadline exceeded")]
  DeadlineExceeded,
}

/// Errors surfaced by a `WorkGate`.
#[derive(Error, Debug, Clone)]
pub enum GateError {
  /// The gate has been closed; the task will never run.
  #[error("gate closed")]
  GateClosed,

  /// Every slot was taken when a non-blocking admission was attempted.
  #[error("gate full")]
  GateFull,

  #[error(transparent)]
  Cancelled(#[from] CancelCause),

  /// A detached submission found no Tokio runtime to spawn on.
  #[error("no tokio runtime available to run the task")]
  NoRuntime,

  /// A detached task panicked with an error value, which is kept as the source.
  #[error("panic recovered: {0}")]
  TaskPanicked(#[source] Arc<dyn StdError + Send + Sync>),

  /// A detached task panicked with a non-error payload.
  #[error("panic recovered: {0}")]
  TaskPanickedWithValue(String),
}

impl GateError {
  pub fn is_closed(&self) -> bool {
    matches!(self, GateError::GateClosed)
  }

  pub fn is_full(&self) -> bool {
    matches!(self, GateError::GateFull)
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, GateError::Cancelled(_))
  }

  /// True for both panic variants.
  pub fn is_panic(&self) -> bool {
    matches!(self, GateError::TaskPanicked(_) | GateError::TaskPanickedWithValue(_))
  }

  /// Converts a payload caught by `catch_unwind` into a reportable error.
  ///
  /// Payloads raised with `std::panic::panic_any` carrying a boxed or shared
  /// error (or a `GateError`) are preserved as the source. `panic!` messages
  /// are kept verbatim.
  pub(crate) fn from_panic_payload(payload: Box<dyn Any + Send>) -> GateError {
    let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
      Ok(err) => return GateError::TaskPanicked(Arc::from(*err)),
      Err(other) => other,
    };
    let payload = match payload.downcast::<Arc<dyn StdError + Send + Sync>>() {
      Ok(err) => return GateError::TaskPanicked(*err),
      Err(other) => other,
    };
    let payload = match payload.downcast::<GateError>() {
      Ok(err) => return GateError::TaskPanicked(Arc::new(*err)),
      Err(other) => other,
    };

    if let Some(message) = payload.downcast_ref::<&'static str>() {
      GateError::TaskPanickedWithValue((*message).to_string())
    } else if let Some(message) = payload.downcast_ref::<String>() {
      GateError::TaskPanickedWithValue(message.clone())
    } else {
      GateError::TaskPanickedWithValue("non-string panic payload".to_string())
    }
  }
}
