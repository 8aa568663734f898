//! Asynchronous order-status reconciliation: a fixed pool of workers
//! polling the external accrual service until each submitted order
//! reaches a terminal state.

pub mod pool;
pub mod queue;
pub mod rate_gate;
pub mod worker;

pub use pool::ReconcilePool;
pub use queue::TaskQueue;
pub use rate_gate::RateGate;
