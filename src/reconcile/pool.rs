//! Dispatcher: owns the task queue and the worker set, bridges one into
//! the other through a bounded hand-off channel.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::adapters::{AccrualClient, StorageUpdater};
use crate::config::PoolConfig;
use crate::coordination::ShutdownController;
use crate::domain::Task;
use crate::reconcile::worker::Worker;
use crate::reconcile::{RateGate, TaskQueue};

/// Reconciliation worker pool.
///
/// Producers enqueue with [`ReconcilePool::append_task`]; the hosting
/// process drives the pool with [`ReconcilePool::run_background`] and
/// stops it through the shared [`ShutdownController`].
pub struct ReconcilePool<C, S> {
    queue: Arc<TaskQueue>,
    gate: Arc<RateGate>,
    client: Arc<C>,
    storage: Arc<S>,
    config: PoolConfig,
    shutdown: Arc<ShutdownController>,
}

impl<C, S> ReconcilePool<C, S>
where
    C: AccrualClient + 'static,
    S: StorageUpdater + 'static,
{
    pub fn new(
        client: Arc<C>,
        storage: Arc<S>,
        config: PoolConfig,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            gate: Arc::new(RateGate::new(config.dispatch_interval())),
            client,
            storage,
            config,
            shutdown,
        }
    }

    /// Enqueue one order for reconciliation. Fire-and-forget: enqueueing
    /// cannot fail and never blocks the producer.
    pub fn append_task(&self, login: &str, order_number: &str) {
        debug!(login, order = order_number, "task enqueued");
        self.queue.push(Task::new(login, order_number));
    }

    /// Current backlog, for logging and health reporting
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the worker set and forward queued tasks to it until
    /// shutdown is requested.
    ///
    /// A full hand-off channel blocks this forwarding loop only;
    /// producers calling [`ReconcilePool::append_task`] are never slowed.
    pub async fn run_background(&self) {
        info!(
            concurrency = self.config.concurrency,
            interval_ms = self.config.dispatch_interval_ms,
            "starting reconciliation pool"
        );

        let (task_tx, task_rx) = mpsc::channel::<Task>(self.config.handoff_capacity);
        let task_rx = Arc::new(Mutex::new(task_rx));

        for id in 1..=self.config.concurrency {
            let worker = Worker::new(
                id,
                task_rx.clone(),
                self.gate.clone(),
                self.client.clone(),
                self.storage.clone(),
                self.config.retry,
                self.config.dispatch_interval(),
                self.shutdown.token(),
            );
            tokio::spawn(worker.run());
        }

        let mut token = self.shutdown.token();
        loop {
            let task = tokio::select! {
                _ = token.cancelled() => break,
                task = self.queue.pop_wait() => task,
            };

            let order = task.order_number.clone();
            tokio::select! {
                _ = token.cancelled() => {
                    warn!(order = %order, "shutdown while forwarding, dropping task");
                    break;
                }
                sent = task_tx.send(task) => {
                    if sent.is_err() {
                        error!("hand-off channel closed, stopping dispatcher");
                        break;
                    }
                }
            }
        }

        info!("closing reconciliation pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AccrualReply;
    use crate::config::RetryPolicy;
    use crate::domain::OrderStatus;
    use crate::error::Result;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Resolves every order as PROCESSED after a simulated network delay,
    /// tracking how many fetches overlap.
    struct CountingClient {
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
    }

    impl CountingClient {
        fn new(delay: Duration) -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                delay,
            }
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AccrualClient for CountingClient {
        async fn fetch_order(&self, order_number: &str) -> Result<AccrualReply> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let body = format!(
                r#"{{"order":"{order_number}","status":"PROCESSED","accrual":10}}"#
            );
            Ok(AccrualReply::new(StatusCode::OK, None, body.into_bytes()))
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        updates: StdMutex<Vec<(String, OrderStatus)>>,
    }

    impl RecordingStorage {
        fn len(&self) -> usize {
            self.updates.lock().unwrap().len()
        }

        fn orders(&self) -> Vec<String> {
            self.updates
                .lock()
                .unwrap()
                .iter()
                .map(|(_, status)| status.order.clone())
                .collect()
        }
    }

    #[async_trait]
    impl StorageUpdater for RecordingStorage {
        async fn update(&self, login: &str, status: &OrderStatus) -> Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push((login.to_string(), status.clone()));
            Ok(())
        }
    }

    fn test_config(concurrency: usize) -> PoolConfig {
        PoolConfig {
            concurrency,
            dispatch_interval_ms: 10,
            handoff_capacity: 10,
            retry: RetryPolicy::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_tasks_processed_with_bounded_concurrency() {
        let controller = Arc::new(ShutdownController::new());
        let client = Arc::new(CountingClient::new(Duration::from_millis(300)));
        let storage = Arc::new(RecordingStorage::default());
        let pool = Arc::new(ReconcilePool::new(
            client.clone(),
            storage.clone(),
            test_config(3),
            controller.clone(),
        ));

        for i in 0..5 {
            pool.append_task("alice", &format!("order-{i}"));
        }

        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run_background().await })
        };

        while storage.len() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        controller.request_shutdown();
        runner.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller.wait_for_completion())
            .await
            .expect("workers must stop after shutdown");

        assert_eq!(storage.len(), 5);
        assert!(
            client.max_active() <= 3,
            "more than `concurrency` jobs ran at once: {}",
            client.max_active()
        );
        assert!(client.max_active() >= 2, "pool never ran jobs in parallel");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_preserves_fifo() {
        let controller = Arc::new(ShutdownController::new());
        let client = Arc::new(CountingClient::new(Duration::ZERO));
        let storage = Arc::new(RecordingStorage::default());
        let pool = Arc::new(ReconcilePool::new(
            client,
            storage.clone(),
            test_config(1),
            controller.clone(),
        ));

        for i in 0..4 {
            pool.append_task("bob", &format!("{i}"));
        }

        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run_background().await })
        };

        while storage.len() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        controller.request_shutdown();
        runner.await.unwrap();

        assert_eq!(storage.orders(), vec!["0", "1", "2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_idle_pool() {
        let controller = Arc::new(ShutdownController::new());
        let client = Arc::new(CountingClient::new(Duration::ZERO));
        let storage = Arc::new(RecordingStorage::default());
        let pool = Arc::new(ReconcilePool::new(
            client,
            storage,
            test_config(3),
            controller.clone(),
        ));

        let runner = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run_background().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.request_shutdown();

        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("run_background must return on shutdown")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller.wait_for_completion())
            .await
            .expect("all workers must stop on shutdown");
    }

    #[tokio::test]
    async fn test_append_task_updates_backlog() {
        let controller = Arc::new(ShutdownController::new());
        let client = Arc::new(CountingClient::new(Duration::ZERO));
        let storage = Arc::new(RecordingStorage::default());
        let pool = ReconcilePool::new(client, storage, test_config(1), controller);

        assert_eq!(pool.queue_len(), 0);
        pool.append_task("alice", "42");
        pool.append_task("alice", "43");
        assert_eq!(pool.queue_len(), 2);
    }
}
