pub mod disk;
pub mod file_store;
pub mod loader;
pub mod program;

pub use disk::{BlockId, DiskAllocator, DiskBlock};
pub use file_store::{FileKind, FileStore, VirtualFile};
pub use program::WorkloadDescriptor;
