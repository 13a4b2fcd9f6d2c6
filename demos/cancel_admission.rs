use workgate::{AdmissionContext, GateError, WorkGate};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Cancelable Admission Example ---");

  let gate = WorkGate::new(1).with_name("cancel_gate");
  let held = gate.acquire().await.expect("fresh gate has a free slot");
  info!("Holding the only slot; the next submission has to wait.");

  let (report_tx, report_rx) = tokio::sync::oneshot::channel();
  gate.do_async_context(
    AdmissionContext::with_timeout(CancellationToken::new(), Duration::from_millis(200)),
    async {
      info!("This task should never run.");
    },
    Some(Box::new(move |err: GateError| {
      let _ = report_tx.send(err);
    })),
  );

  match report_rx.await {
    Ok(err) => info!("Admission abandoned: {}", err),
    Err(_) => info!("Error handler dropped without a report."),
  }

  drop(held);
  gate.close();
  info!("--- Cancelable Admission Example End ---");
}
