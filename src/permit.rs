use std::fmt;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::trace;

/// One admission slot held on a `WorkGate`.
///
/// The slot is returned to the gate when the permit is dropped, which also
/// happens while unwinding out of a panicking task. Every admitting path in
/// the gate holds one of these, so only the raw `enter`/`leave` pair has to
/// balance releases by hand.
pub struct GatePermit {
  permit: OwnedSemaphorePermit,
  gate_name: Arc<str>,
}

impl GatePermit {
  pub(crate) fn new(permit: OwnedSemaphorePermit, gate_name: Arc<str>) -> Self {
    Self { permit, gate_name }
  }

  /// Name of the gate this slot belongs to.
  pub fn gate_name(&self) -> &str {
    &self.gate_name
  }
}

impl fmt::Debug for GatePermit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GatePermit")
      .field("gate_name", &self.gate_name)
      .field("num_permits", &self.permit.num_permits())
      .finish()
  }
}

impl Drop for GatePermit {
  fn drop(&mut self) {
    trace!(gate = %self.gate_name, "Releasing gate slot.");
  }
}
