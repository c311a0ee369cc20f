use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhiteboardError {
    /// No drawing surface, or a container with no area, at mount time.
    /// The host retries on the next valid mount.
    #[error("drawing surface unavailable ({width}x{height})")]
    SurfaceUnavailable { width: f32, height: f32 },
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("canvas has no pixels to export")]
    EmptyRaster,
    #[error("failed to write export to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode export document")]
    Encode(#[from] serde_json::Error),
}
