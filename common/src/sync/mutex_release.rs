pub use tokio::sync::{Mutex, MutexGuard};
