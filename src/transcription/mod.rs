mod tracker;

pub use tracker::TranscriptionTracker;
