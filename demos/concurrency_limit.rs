use workgate::{GateError, WorkGate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn long_task_fn(id: usize, running: Arc<AtomicUsize>) -> Result<String, GateError> {
  let now = running.fetch_add(1, Ordering::SeqCst) + 1;
  info!("Task {} starting (running now: {})", id, now);
  tokio::time::sleep(Duration::from_secs(1)).await;
  running.fetch_sub(1, Ordering::SeqCst);
  Ok(format!("Task {} finished", id))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  let max_workers = 2;
  let num_tasks = 5;
  info!("--- Concurrency Limit Example (Limit: {}) ---", max_workers);
  info!(
    "Submitting {} tasks, each takes 1 sec. With a limit of {}, this should take ~{} secs.",
    num_tasks,
    max_workers,
    (num_tasks as f32 / max_workers as f32).ceil()
  );

  let gate = WorkGate::new(max_workers).with_name("concurrency_gate");
  let running = Arc::new(AtomicUsize::new(0));

  let mut callers = Vec::new();
  for i in 0..num_tasks {
    let gate = gate.clone();
    let running = running.clone();
    callers.push(tokio::spawn(async move { gate.do_task(long_task_fn(i, running)).await }));
  }

  for caller in callers {
    match caller.await {
      Ok(Ok(result)) => info!("main: {}", result),
      Ok(Err(e)) => info!("main: task refused: {}", e),
      Err(join_error) => info!("main: caller failed: {}", join_error),
    }
  }

  gate.close();
  info!("--- Concurrency Limit Example End ---");
}
