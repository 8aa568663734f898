pub mod shutdown;

pub use shutdown::{ShutdownController, ShutdownToken};
