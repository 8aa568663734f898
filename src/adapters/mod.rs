pub mod accrual_http;
pub mod postgres;

pub use accrual_http::{AccrualClient, AccrualReply, HttpAccrualClient};
pub use postgres::{PostgresStore, StorageUpdater};

#[cfg(test)]
pub use accrual_http::MockAccrualClient;
#[cfg(test)]
pub use postgres::MockStorageUpdater;
