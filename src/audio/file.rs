use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::info;

/// Header-level facts about a finished WAV recording
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub file_size_bytes: u64,
}

impl AudioFile {
    /// Read the WAV header without loading samples
    pub fn inspect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;

        let spec = reader.spec();
        // duration() counts frames, i.e. samples per channel
        let duration_seconds = if spec.sample_rate == 0 {
            0.0
        } else {
            reader.duration() as f64 / spec.sample_rate as f64
        };

        let file_size_bytes = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        info!(
            "Inspected audio file {}: {:.1}s, {}Hz, {} channels, {} bytes",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            file_size_bytes
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            file_size_bytes,
        })
    }
}
