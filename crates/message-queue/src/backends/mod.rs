//! Reference backend implementations.
//!
//! Each implements [`Backend`](crate::backend::Backend) and satisfies its
//! at-most-once receive contract.

pub mod filesystem;
pub mod memory;
pub mod relay;

pub use filesystem::FileSystemBackend;
pub use memory::InMemoryBackend;
pub use relay::{BasicAuth, RelayBackend, RelayConfig, RelayFrame, RELAY_ACK};
