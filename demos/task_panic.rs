use workgate::{GateError, WorkGate};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let gate = WorkGate::new(1).with_name("panic_gate");
  let (report_tx, report_rx) = tokio::sync::oneshot::channel();

  gate
    .do_async(
      async {
        info!("Panicking Task: Starting...");
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("Panicking Task: About to panic!");
        panic!("This task is designed to panic!");
      },
      Some(Box::new(move |err: GateError| {
        let _ = report_tx.send(err);
      })),
    )
    .await
    .expect("gate should admit the task");

  match report_rx.await {
    Ok(err) => info!("Error handler received: {}", err),
    Err(_) => info!("Error handler was never called."),
  }

  let follow_up: Result<&str, GateError> = gate.do_task(async { Ok("slot was released") }).await;
  info!("Follow-up task: {:?}", follow_up);

  gate.close();
  info!("--- Task Panic Example End ---");
}
