pub mod matched_ids;

pub use matched_ids::{JsonFileStore, MatchedIdStore, MemoryStore, StoreError};
