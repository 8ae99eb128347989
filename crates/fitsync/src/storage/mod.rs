//! Storage traits and implementations
//!
//! The sync core never decides persistence formats itself: durable state
//! goes through a minimal key-value interface and parsed rows go to a
//! caller-owned sink. The trait seams make both swappable (memory, file,
//! host-backed) in tests and in production wiring.

mod file;
mod memory;
mod traits;

pub use file::FileKvStore;
pub use memory::{InMemoryKvStore, InMemoryRowSink, InProcessLock, UnavailableLock};
pub use traits::{AdvisoryLock, KvStore, LockAcquire, Row, RowSink};
