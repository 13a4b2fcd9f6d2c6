use workgate::{GateError, WorkGate};
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Usage Example ---");

  let gate = WorkGate::new(10).with_name("basic_gate");

  let value: Result<String, GateError> = gate
    .do_task(async {
      info!("Running a task in place while holding a slot.");
      Ok("foo".to_string())
    })
    .await;
  info!("do_task returned: {:?}", value);

  let (done_tx, done_rx) = tokio::sync::oneshot::channel();
  let submitted = gate
    .do_async(
      async move {
        info!("Running a detached task.");
        let _ = done_tx.send("bar");
      },
      Some(Box::new(|err: GateError| tracing::error!("Detached task failed: {}", err))),
    )
    .await;
  info!("do_async admission result: {:?}", submitted);
  info!("Detached task sent: {:?}", done_rx.await);

  gate.close();
  info!("--- Basic Usage Example End ---");
}
