use thiserror::Error;

/// Failures reported by the camera and image-processing collaborators.
#[derive(Debug, Error)]
pub enum VisionError {
    /// The camera could not be opened. A session never starts after this.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    /// A frame could not be captured or decoded. Transient.
    #[error("capture failed: {0}")]
    Capture(String),
    /// The optical-flow step failed for the whole frame.
    #[error("tracking failed: {0}")]
    Tracking(String),
}

/// Failures of the shared state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("store codec: {0}")]
    Codec(String),
    #[error("store server error: {0}")]
    Remote(String),
    #[error("store connection closed")]
    Closed,
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

#[cfg(feature = "camera")]
impl From<opencv::Error> for VisionError {
    fn from(e: opencv::Error) -> Self {
        VisionError::Tracking(e.to_string())
    }
}
