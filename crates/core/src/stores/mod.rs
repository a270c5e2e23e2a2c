pub mod memory;
pub mod qdrant;

pub use memory::InMemoryStore;
pub use qdrant::{QdrantStore, DEFAULT_COLLECTION};
