pub mod memory;
pub mod sql;

pub use memory::InMemoryRecordStore;
pub use sql::SqlRecordStore;
