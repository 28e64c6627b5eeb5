//! Configuration sections of `booklet.toml`.

mod compile;
mod storage;
mod sync;
mod toolchain;

pub use compile::CompileConfig;
pub use storage::StorageConfig;
pub use sync::SyncConfig;
pub use toolchain::{FontEntry, ToolchainConfig};
