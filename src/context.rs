use crate::error::CancelCause;

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation signal raced against admission in `WorkGate::do_async_context`.
///
/// Fires when its `CancellationToken` is cancelled or when the optional
/// deadline passes, whichever happens first. Clones share the same token.
#[derive(Debug, Clone)]
pub struct AdmissionContext {
  token: CancellationToken,
  deadline: Option<Instant>,
}

impl AdmissionContext {
  /// A context that never fires unless explicitly cancelled through `cancel()`.
  pub fn background() -> Self {
    Self::new(CancellationToken::new())
  }

  pub fn new(token: CancellationToken) -> Self {
    Self { token, deadline: None }
  }

  pub fn with_deadline(token: CancellationToken, deadline: Instant) -> Self {
    Self {
      token,
      deadline: Some(deadline),
    }
  }

  pub fn with_timeout(token: CancellationToken, timeout: Duration) -> Self {
    Self::with_deadline(token, Instant::now() + timeout)
  }

  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn cancel(&self) {
    self.token.cancel();
  }

  /// Returns the cause if the context has already fired.
  /// Explicit cancellation wins over an expired deadline.
  pub fn err(&self) -> Option<CancelCause> {
    if self.token.is_cancelled() {
      Some(CancelCause::Cancelled)
    } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      Some(CancelCause::DeadlineExceeded)
    } else {
      None
    }
  }

  /// Resolves once the context fires.
  pub async fn done(&self) -> CancelCause {
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          biased;
          _ = self.token.cancelled() => CancelCause::Cancelled,
          _ = time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
        }
      }
      None => {
        self.token.cancelled().await;
        CancelCause::Cancelled
      }
    }
  }
}

impl From<CancellationToken> for AdmissionContext {
  fn from(token: CancellationToken) -> Self {
    Self::new(token)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_background_context_stays_quiet() {
    let ctx = AdmissionContext::background();
    assert_eq!(ctx.err(), None);
    assert!(ctx.deadline().is_none());

    let fired = time::timeout(Duration::from_millis(30), ctx.done()).await;
    assert!(fired.is_err(), "background context must not fire on its own");
  }

  #[tokio::test]
  async fn test_cancel_fires_with_cancelled_cause() {
    let token = CancellationToken::new();
    let ctx = AdmissionContext::from(token.clone());
    token.cancel();

    assert_eq!(ctx.err(), Some(CancelCause::Cancelled));
    assert_eq!(ctx.done().await, CancelCause::Cancelled);
  }

  #[tokio::test]
  async fn test_timeout_fires_with_deadline_cause() {
    let ctx = AdmissionContext::with_timeout(CancellationToken::new(), Duration::from_millis(20));
    assert_eq!(ctx.err(), None);

    assert_eq!(ctx.done().await, CancelCause::DeadlineExceeded);
    assert_eq!(ctx.err(), Some(CancelCause::DeadlineExceeded));
  }

  #[tokio::test]
  async fn test_explicit_cancel_wins_over_expired_deadline() {
    let ctx = AdmissionContext::with_deadline(CancellationToken::new(), Instant::now());
    ctx.cancel();

    assert_eq!(ctx.err(), Some(CancelCause::Cancelled));
    assert_eq!(ctx.done().await, CancelCause::Cancelled);
  }
}
