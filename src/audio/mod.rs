pub mod file;
pub mod storage;

pub use file::AudioFile;
pub use storage::{AudioStorage, AudioStream, LocalDiskStorage};
