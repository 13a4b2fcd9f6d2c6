use crate::error::GateError;
use crate::permit::GatePermit;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tracing::{debug, error, trace};

/// Callback receiving errors from detached submissions.
///
/// Invoked at most once per submission, from the runtime task that performed
/// the admission or ran the task.
pub type ErrorHandler = Box<dyn FnOnce(GateError) + Send + 'static>;

/// Runs an admitted task to completion, containing any panic it raises.
///
/// The slot is released before the handler is called, so a handler that
/// resubmits to the same gate can always be admitted once the gate has room.
pub(crate) async fn run_admitted<Fut>(permit: GatePermit, task: Fut, error_handler: Option<ErrorHandler>)
where
  Fut: Future<Output = ()> + Send,
{
  let outcome = AssertUnwindSafe(task).catch_unwind().await;
  drop(permit);

  match outcome {
    Ok(()) => trace!("Gate task completed."),
    Err(payload) => {
      let err = GateError::from_panic_payload(payload);
      error!(error = %err, "Gate task panicked; panic contained at the gate boundary.");
      report(error_handler, err);
    }
  }
}

/// Hands `err` to the handler, if any. A panicking handler is contained too.
pub(crate) fn report(error_handler: Option<ErrorHandler>, err: GateError) {
  match error_handler {
    Some(handler) => {
      if panic::catch_unwind(AssertUnwindSafe(move || handler(err))).is_err() {
        error!("Gate error handler panicked while reporting an error.");
      }
    }
    None => debug!(error = %err, "No error handler registered, dropping error."),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::WorkGate;
  use std::sync::{Arc, Mutex};

  fn capturing_handler() -> (ErrorHandler, Arc<Mutex<Vec<GateError>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: ErrorHandler = Box::new(move |err: GateError| sink.lock().unwrap().push(err));
    (handler, seen)
  }

  #[tokio::test]
  async fn test_successful_task_does_not_report() {
    let gate = WorkGate::new(1);
    let permit = gate.acquire().await.unwrap();
    let (handler, seen) = capturing_handler();

    run_admitted(permit, async {}, Some(handler)).await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(gate.active_workers(), 0);
  }

  #[tokio::test]
  async fn test_panicking_task_releases_slot_and_reports() {
    let gate = WorkGate::new(1);
    let permit = gate.acquire().await.unwrap();
    let (handler, seen) = capturing_handler();

    run_admitted(permit, async { panic!("boom") }, Some(handler)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].to_string(), "panic recovered: boom");
    assert_eq!(gate.active_workers(), 0);
  }

  #[tokio::test]
  async fn test_panic_without_handler_is_swallowed() {
    let gate = WorkGate::new(1);
    let permit = gate.acquire().await.unwrap();

    run_admitted(permit, async { panic!("nobody listens") }, None).await;

    assert_eq!(gate.active_workers(), 0);
  }

  #[test]
  fn test_panicking_handler_is_contained() {
    let handler: ErrorHandler = Box::new(|_: GateError| panic!("handler exploded"));
    report(Some(handler), GateError::GateClosed);
  }
}
