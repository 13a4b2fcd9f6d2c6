use workgate::{GateError, WorkGate};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Close Example ---");

  let gate = WorkGate::new(2).with_name("closing_gate");
  let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();

  for id in 0..2 {
    let done_tx = done_tx.clone();
    gate
      .do_async(
        async move {
          info!("Task {} running, will take 500ms.", id);
          tokio::time::sleep(Duration::from_millis(500)).await;
          let _ = done_tx.send(id);
        },
        None,
      )
      .await
      .expect("gate is open");
  }

  info!("Closing the gate while two tasks are still running.");
  gate.close();

  let refused: Result<(), GateError> = gate.do_task(async { Ok(()) }).await;
  info!("Submission after close: {:?}", refused);

  for _ in 0..2 {
    if let Some(id) = done_rx.recv().await {
      info!("Task {} finished after close.", id);
    }
  }
  info!("--- Graceful Close Example End ---");
}
