use crate::context::AdmissionContext;
use crate::error::GateError;
use crate::permit::GatePermit;
use crate::task::{self, ErrorHandler};

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_GATE_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

const DEFAULT_GATE_NAME: &str = "workgate";

/// Caps the number of concurrently running tasks at a fixed limit.
///
/// Admission is backed by a semaphore holding `max_workers` slots. Closing the
/// gate is permanent: waiting and future admissions fail with
/// `GateError::GateClosed`, while tasks that already hold a slot run to
/// completion. The gate never waits for tasks itself; callers who need that
/// track completion on their side.
///
/// Clones share the same slots and closed state.
#[derive(Clone, Debug)]
pub struct WorkGate {
  name: Arc<str>,
  max_workers: usize,
  slots: Arc<Semaphore>,
  closed: Arc<AtomicBool>,
  runtime: Option<TokioHandle>,
}

impl WorkGate {
  /// Creates an open gate with `max_workers` slots. Zero is treated as one.
  ///
  /// When called inside a Tokio runtime, that runtime is remembered for
  /// spawning detached tasks, so the gate can later be driven from plain
  /// threads.
  pub fn new(max_workers: usize) -> Self {
    let max_workers = max_workers.clamp(1, Semaphore::MAX_PERMITS);
    Self {
      name: Arc::from(DEFAULT_GATE_NAME),
      max_workers,
      slots: Arc::new(Semaphore::new(max_workers)),
      closed: Arc::new(AtomicBool::new(false)),
      runtime: TokioHandle::try_current().ok(),
    }
  }

  /// Sets the name reported in this gate's tracing output.
  pub fn with_name(mut self, name: &str) -> Self {
    self.name = Arc::from(name);
    self
  }

  /// Spawns detached tasks on `handle` instead of the runtime captured at
  /// construction.
  pub fn with_runtime(mut self, handle: TokioHandle) -> Self {
    self.runtime = Some(handle);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn max_workers(&self) -> usize {
    self.max_workers
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Number of slots currently held. Informational only; it can be stale by
  /// the time the caller looks at it.
  pub fn active_workers(&self) -> usize {
    self.max_workers.saturating_sub(self.slots.available_permits())
  }

  /// Waits for a slot. Returns `false` if the gate is, or becomes, closed.
  ///
  /// Low level API. When this returns `true` the caller owns the slot and
  /// must call `leave()` exactly once; prefer `acquire()`, whose permit
  /// releases itself.
  pub async fn enter(&self) -> bool {
    match self.admit().await {
      Ok(permit) => {
        permit.forget();
        true
      }
      Err(_) => false,
    }
  }

  /// Returns the slot taken by a successful `enter()`.
  pub fn leave(&self) {
    debug_assert!(
      self.slots.available_permits() < self.max_workers,
      "WorkGate::leave called without a matching enter"
    );
    self.slots.add_permits(1);
    trace!(gate = %self.name, "Slot returned through leave().");
  }

  /// Waits for a slot and returns it as a guard that releases on drop.
  pub async fn acquire(&self) -> Result<GatePermit, GateError> {
    let permit = self.admit().await?;
    Ok(GatePermit::new(permit, self.name.clone()))
  }

  /// Takes a slot only if one is free right now.
  ///
  /// A closed gate reports `GateClosed` even when it is also full.
  pub fn try_acquire(&self) -> Result<GatePermit, GateError> {
    let permit = self.try_admit()?;
    Ok(GatePermit::new(permit, self.name.clone()))
  }

  /// Permanently closes the gate. Safe to call repeatedly and concurrently;
  /// returns `true` only for the call that performed the transition.
  ///
  /// Does not cancel or wait for tasks that already hold a slot.
  pub fn close(&self) -> bool {
    if self.closed.swap(true, Ordering::AcqRel) {
      trace!(gate = %self.name, "Close requested on an already closed gate.");
      return false;
    }
    self.slots.close();
    info!(
      gate = %self.name,
      active = self.active_workers(),
      "Gate closed. In-flight tasks will run to completion."
    );
    true
  }

  /// Runs `task` in place once a slot is free and returns its result.
  ///
  /// The slot is released when the task finishes, is dropped, or panics; a
  /// panic continues into the caller. On a closed gate the task is dropped
  /// without being polled and `GateClosed` is returned through `E`.
  pub async fn do_task<Fut, T, E>(&self, task: Fut) -> Result<T, E>
  where
    Fut: Future<Output = Result<T, E>>,
    E: From<GateError>,
  {
    let _permit = self.acquire().await?;
    task.await
  }

  /// Like `do_task`, but fails with `GateFull` instead of waiting for a slot.
  pub async fn try_do<Fut, T, E>(&self, task: Fut) -> Result<T, E>
  where
    Fut: Future<Output = Result<T, E>>,
    E: From<GateError>,
  {
    let _permit = self.try_acquire()?;
    task.await
  }

  /// Waits for a slot, then spawns `task` and returns without waiting for it.
  ///
  /// The slot travels with the spawned task and is released when it ends. A
  /// panic inside the task is contained and passed to `error_handler`, or
  /// dropped if there is none. An error value survives as the report's
  /// `source()` only when the task panics with a `Box<dyn Error + Send + Sync>`
  /// or `Arc<dyn Error + Send + Sync>` (via `std::panic::panic_any`); other
  /// non-string payloads cannot be inspected and are reported generically.
  ///
  /// A closed gate, or the lack of a Tokio runtime to spawn on, is reported
  /// here before anything is spawned.
  pub async fn do_async<Fut>(&self, task: Fut, error_handler: Option<ErrorHandler>) -> Result<(), GateError>
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    let handle = self.spawn_handle()?;
    let permit = self.acquire().await?;
    self.spawn_instrumented(&handle, task::run_admitted(permit, task, error_handler));
    Ok(())
  }

  /// Submits `task` without blocking the caller, racing admission against `ctx`.
  ///
  /// Every outcome goes through `error_handler`: `Cancelled` if the context
  /// fires before a slot is free, `GateClosed` if the gate is closed, or a
  /// panic error from the task itself. A free slot wins over a context that
  /// has already fired. Once admitted, the task is not interrupted by `ctx`.
  /// Panic payloads are classified as in `do_async`: only boxed or shared
  /// `dyn Error + Send + Sync` values are kept as the report's `source()`.
  ///
  /// Admission runs on a spawned task, so the gate needs a Tokio runtime: the
  /// one set with `with_runtime`, the one captured by `new`, or the caller's
  /// own. Without any of them nothing is spawned and `NoRuntime` is reported
  /// through `error_handler`; the caller never panics.
  pub fn do_async_context<Fut>(&self, ctx: AdmissionContext, task: Fut, error_handler: Option<ErrorHandler>)
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    let handle = match self.spawn_handle() {
      Ok(handle) => handle,
      Err(err) => {
        task::report(error_handler, err);
        return;
      }
    };
    let gate = self.clone();
    self.spawn_instrumented(&handle, async move {
      let admitted = tokio::select! {
        biased;
        permit = gate.acquire() => permit,
        cause = ctx.done() => Err(GateError::Cancelled(cause)),
      };

      match admitted {
        Ok(permit) => task::run_admitted(permit, task, error_handler).await,
        Err(err) => {
          debug!(error = %err, "Admission abandoned before a slot was free.");
          task::report(error_handler, err);
        }
      }
    });
  }

  async fn admit(&self) -> Result<OwnedSemaphorePermit, GateError> {
    if self.is_closed() {
      debug!(gate = %self.name, "Admission refused: gate closed.");
      return Err(GateError::GateClosed);
    }
    match self.slots.clone().acquire_owned().await {
      Ok(permit) => self.ensure_open(permit),
      Err(_) => {
        debug!(gate = %self.name, "Admission refused: gate closed while waiting.");
        Err(GateError::GateClosed)
      }
    }
  }

  fn try_admit(&self) -> Result<OwnedSemaphorePermit, GateError> {
    if self.is_closed() {
      debug!(gate = %self.name, "Admission refused: gate closed.");
      return Err(GateError::GateClosed);
    }
    match self.slots.clone().try_acquire_owned() {
      Ok(permit) => self.ensure_open(permit),
      Err(TryAcquireError::Closed) => Err(GateError::GateClosed),
      Err(TryAcquireError::NoPermits) => {
        debug!(gate = %self.name, max_workers = self.max_workers, "Admission refused: gate full.");
        Err(GateError::GateFull)
      }
    }
  }

  // The closed flag flips before the semaphore closes; a permit won in between
  // goes straight back.
  fn ensure_open(&self, permit: OwnedSemaphorePermit) -> Result<OwnedSemaphorePermit, GateError> {
    if self.is_closed() {
      drop(permit);
      return Err(GateError::GateClosed);
    }
    trace!(gate = %self.name, available = self.slots.available_permits(), "Slot acquired.");
    Ok(permit)
  }

  fn spawn_handle(&self) -> Result<TokioHandle, GateError> {
    match &self.runtime {
      Some(handle) => Ok(handle.clone()),
      None => TokioHandle::try_current().map_err(|_| {
        warn!(gate = %self.name, "No Tokio runtime available to spawn a gate task.");
        GateError::NoRuntime
      }),
    }
  }

  fn spawn_instrumented<Fut>(&self, handle: &TokioHandle, future: Fut)
  where
    Fut: Future<Output = ()> + Send + 'static,
  {
    let task_id = NEXT_GATE_TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    handle.spawn(future.instrument(info_span!("gate_task", gate = %self.name, %task_id)));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::{sleep, timeout};

  #[test]
  fn test_zero_workers_is_coerced_to_one() {
    let gate = WorkGate::new(0);
    assert_eq!(gate.max_workers(), 1);
    assert_eq!(gate.active_workers(), 0);
    assert!(!gate.is_closed());
    assert_eq!(gate.name(), DEFAULT_GATE_NAME);
  }

  #[test]
  fn test_with_name() {
    let gate = WorkGate::new(3).with_name("uploads");
    assert_eq!(gate.name(), "uploads");
    assert_eq!(gate.max_workers(), 3);
  }

  #[tokio::test]
  async fn test_enter_leave_accounting() {
    let gate = WorkGate::new(2);
    assert!(gate.enter().await);
    assert!(gate.enter().await);
    assert_eq!(gate.active_workers(), 2);
    assert!(matches!(gate.try_acquire(), Err(GateError::GateFull)));

    gate.leave();
    assert_eq!(gate.active_workers(), 1);
    gate.leave();
    assert_eq!(gate.active_workers(), 0);
  }

  #[tokio::test]
  async fn test_enter_after_close_returns_false() {
    let gate = WorkGate::new(2);
    gate.close();
    assert!(!gate.enter().await);
    assert_eq!(gate.active_workers(), 0);
  }

  #[tokio::test]
  async fn test_waiting_enter_is_released_by_close() {
    let gate = WorkGate::new(1);
    assert!(gate.enter().await);

    let waiter = {
      let gate = gate.clone();
      tokio::spawn(async move { gate.enter().await })
    };
    sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "enter should wait while the gate is full");

    gate.close();
    let entered = timeout(Duration::from_millis(200), waiter)
      .await
      .expect("close must wake waiting enter()")
      .unwrap();
    assert!(!entered);

    // The slot held before closing can still be handed back.
    gate.leave();
    assert_eq!(gate.active_workers(), 0);
  }

  #[tokio::test]
  async fn test_permit_drop_frees_slot() {
    let gate = WorkGate::new(1);
    let permit = gate.acquire().await.unwrap();
    assert_eq!(permit.gate_name(), DEFAULT_GATE_NAME);
    assert!(gate.try_acquire().unwrap_err().is_full());

    drop(permit);
    assert!(gate.try_acquire().is_ok());
  }

  #[tokio::test]
  async fn test_closed_takes_precedence_over_full() {
    let gate = WorkGate::new(1);
    let _held = gate.acquire().await.unwrap();
    gate.close();

    assert!(gate.try_acquire().unwrap_err().is_closed());
    let res: Result<(), GateError> = gate.try_do(async { Ok(()) }).await;
    assert!(matches!(res, Err(GateError::GateClosed)));
  }

  #[test]
  fn test_close_transitions_once() {
    let gate = WorkGate::new(4);
    assert!(gate.close());
    assert!(!gate.close());
    assert!(!gate.clone().close());
    assert!(gate.is_closed());
  }

  #[tokio::test]
  async fn test_close_keeps_held_slots_valid() {
    let gate = WorkGate::new(2);
    let permit = gate.acquire().await.unwrap();
    gate.close();
    assert_eq!(gate.active_workers(), 1);
    drop(permit);
    assert_eq!(gate.active_workers(), 0);
    assert!(gate.acquire().await.unwrap_err().is_closed());
  }

  #[tokio::test]
  async fn test_with_runtime_spawns_on_given_handle() {
    let gate = WorkGate::new(1).with_runtime(TokioHandle::current());
    let (tx, rx) = tokio::sync::oneshot::channel();
    gate
      .do_async(
        async move {
          let _ = tx.send(7u8);
        },
        None,
      )
      .await
      .unwrap();
    assert_eq!(rx.await.unwrap(), 7);
  }
}
