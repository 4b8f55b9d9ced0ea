//! Persistence for the co-borrowing pipeline: where events come from and
//! where cluster assignments and rule sets go.

pub mod json_file;
pub mod memory;
pub mod traits;

pub use json_file::{BorrowRecord, JsonFileStore};
pub use memory::MemoryStore;
pub use traits::{EventSource, ResultReader, ResultSink};
