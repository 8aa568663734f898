pub mod adapters;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod reconcile;

pub use adapters::{AccrualClient, AccrualReply, HttpAccrualClient, PostgresStore, StorageUpdater};
pub use config::{AppConfig, LoggingConfig, PoolConfig, RetryPolicy};
pub use coordination::{ShutdownController, ShutdownToken};
pub use domain::{OrderState, OrderStatus, Task};
pub use error::{AccrualError, Result};
pub use reconcile::{RateGate, ReconcilePool, TaskQueue};
