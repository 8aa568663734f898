//! Reconciliation worker: picks tasks off the hand-off channel and runs
//! each one's polling loop (the job) to completion.

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::adapters::{AccrualClient, StorageUpdater};
use crate::config::RetryPolicy;
use crate::coordination::ShutdownToken;
use crate::domain::{OrderStatus, Task};
use crate::reconcile::RateGate;

pub(crate) struct Worker<C, S> {
    id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<Task>>>,
    gate: Arc<RateGate>,
    client: Arc<C>,
    storage: Arc<S>,
    retry: RetryPolicy,
    /// Pause between re-polls of the same order; the shared gate only
    /// throttles new dispatch starts
    poll_pause: Duration,
    token: ShutdownToken,
}

impl<C, S> Worker<C, S>
where
    C: AccrualClient + 'static,
    S: StorageUpdater + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        tasks: Arc<Mutex<mpsc::Receiver<Task>>>,
        gate: Arc<RateGate>,
        client: Arc<C>,
        storage: Arc<S>,
        retry: RetryPolicy,
        poll_pause: Duration,
        token: ShutdownToken,
    ) -> Self {
        Self {
            id,
            tasks,
            gate,
            client,
            storage,
            retry,
            poll_pause,
            token,
        }
    }

    /// Dispatch loop: one gate tick buys one attempt to pick up a task.
    /// Returns (dropping the shutdown guard) when cancellation fires.
    pub(crate) async fn run(mut self) {
        info!(worker = self.id, "worker started");
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    info!(worker = self.id, "worker stopping");
                    return;
                }
                _ = self.gate.acquire() => {
                    let task = self.tasks.lock().await.try_recv().ok();
                    if let Some(task) = task {
                        debug!(worker = self.id, order = %task.order_number, "task picked up");
                        self.job(task).await;
                    }
                }
            }
        }
    }

    /// Per-task polling loop. Runs until the order reaches a terminal
    /// status, an unrecoverable failure aborts it, or shutdown abandons it.
    async fn job(&mut self, task: Task) {
        let mut failures = 0u32;
        loop {
            let reply = tokio::select! {
                _ = self.token.cancelled() => {
                    warn!(worker = self.id, order = %task.order_number, "shutdown during poll, abandoning task");
                    return;
                }
                reply = self.client.fetch_order(&task.order_number) => reply,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    if failures < self.retry.max_attempts {
                        failures += 1;
                        warn!(
                            worker = self.id,
                            order = %task.order_number,
                            attempt = failures,
                            "transport error, retrying: {e}"
                        );
                        if !self.pause(self.retry.backoff()).await {
                            return;
                        }
                        continue;
                    }
                    error!(worker = self.id, order = %task.order_number, "transport error, dropping task: {e}");
                    return;
                }
            };

            match reply.status {
                // The order is unknown to the accrual service or already
                // finalized elsewhere; nothing left to reconcile
                StatusCode::NO_CONTENT | StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                    info!(
                        worker = self.id,
                        order = %task.order_number,
                        status = %reply.status,
                        "nothing to reconcile, dropping task"
                    );
                    return;
                }
                StatusCode::OK => {
                    let status: OrderStatus = match serde_json::from_slice(&reply.body) {
                        Ok(status) => status,
                        Err(e) => {
                            error!(worker = self.id, order = %task.order_number, "malformed status body, dropping task: {e}");
                            return;
                        }
                    };

                    if let Err(e) = self.storage.update(&task.login, &status).await {
                        if failures < self.retry.max_attempts {
                            failures += 1;
                            warn!(
                                worker = self.id,
                                order = %task.order_number,
                                attempt = failures,
                                "storage update failed, retrying: {e}"
                            );
                            if !self.pause(self.retry.backoff()).await {
                                return;
                            }
                            continue;
                        }
                        error!(worker = self.id, order = %task.order_number, "storage update failed, dropping task: {e}");
                        return;
                    }

                    info!(
                        login = %task.login,
                        order = %status.order,
                        status = %status.status,
                        accrual = %status.accrual,
                        "order status persisted"
                    );

                    if status.status.is_terminal() {
                        debug!(worker = self.id, order = %status.order, "job complete");
                        return;
                    }

                    failures = 0;
                    if !self.pause(self.poll_pause).await {
                        return;
                    }
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let Some(secs) = reply.retry_after else {
                        error!(worker = self.id, order = %task.order_number, "429 without Retry-After, dropping task");
                        return;
                    };
                    debug!(worker = self.id, order = %task.order_number, secs, "rate limited, backing off");
                    if !self.pause(Duration::from_secs(secs)).await {
                        return;
                    }
                }
                other => {
                    debug!(worker = self.id, order = %task.order_number, status = %other, "unexpected status, will poll again");
                    if !self.pause(self.poll_pause).await {
                        return;
                    }
                }
            }
        }
    }

    /// Sleep raced against shutdown. Returns false when cancelled, in
    /// which case the current task is abandoned.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => {
                warn!(worker = self.id, "shutdown during pause, abandoning task");
                false
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
