/// Result alias that carries the custom [`WaveSceneError`] type.
pub type Result<T> = std::result::Result<T, WaveSceneError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum WaveSceneError {
    /// A data read was attempted before the first slice arrived from the
    /// producer. Renderers are expected to treat this as "not ready yet"
    /// and skip the frame.
    #[error("no current data slice")]
    NoCurrentSlice,
    /// An operation was invoked in a lifecycle state that does not permit
    /// it, e.g. rendering before initialization or after teardown.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A caller-supplied value was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A timeline declaration could not be accepted.
    #[error("timeline configuration error: {0}")]
    Timeline(String),
    /// A preset document failed validation or could not be bound to the
    /// registered actions.
    #[error("preset error: {0}")]
    Preset(String),
    /// A shared lock was poisoned by a panicking thread.
    #[error("{0} lock has been poisoned")]
    Poisoned(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around FFT processing errors.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    /// Wrapper around JSON (de)serialization errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl WaveSceneError {
    /// Creates an [`WaveSceneError::InvalidArgument`] from any message.
    pub fn invalid_argument<T: Into<String>>(msg: T) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
