//! Content cache, incremental gate and cache file persistence.

pub mod content;
pub mod file;
pub mod gate;

pub use content::{CacheEntry, ContentCache, SerializedCache, Signer};
pub use file::{CacheFile, CacheFileError};
pub use gate::{ContentLoader, FsLoader, IncrementalGate};
