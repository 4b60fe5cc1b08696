use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in the canvas subsystem
#[derive(Error, Debug)]
pub enum CanvasError {
    /// Non-positive sizes, out-of-range bit depths and similar option mistakes
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfiguration { field: &'static str, message: Arc<String> },

    /// A color string that is not `#rgb`, `#rrggbb[aa]`, `rgb()/rgba()` or a known name
    #[error("Cannot parse color '{0}'")]
    ColorParse(Arc<String>),

    /// Options text (TOML/JSON) could not be deserialized
    #[error("Failed to parse options: {0}")]
    OptionsParse(Arc<String>),

    /// Raw pixel bytes that don't match the declared image shape
    #[error("Invalid image data: {0}")]
    InvalidImage(Arc<String>),

    /// The image decoder rejected the bytes
    #[error("Failed to decode image: {0}")]
    ImageDecode(Arc<String>),

    /// The image source could not be read
    #[error("Failed to load image from {path}: {message}")]
    ImageLoad { path: PathBuf, message: Arc<String> },

    /// A data URL that is not `data:<mime>;base64,<payload>`
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(Arc<String>),

    /// `start_shader` was called without a shader callback
    #[error("No shader callback registered")]
    NoShader,

    /// Shader scheduling needs a tokio runtime on the calling thread
    #[error("No async runtime available to schedule shader frames")]
    NoRuntime,

    /// A raster protocol payload could not be produced
    #[error("Failed to encode {protocol} payload: {message}")]
    Encode { protocol: &'static str, message: Arc<String> },

    /// The shared canvas lock was poisoned by a panic
    #[error("Canvas lock poisoned: {0}")]
    LockPoisoned(Arc<String>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Result with CanvasError
pub type Result<T> = std::result::Result<T, CanvasError>;

impl CanvasError {
    /// Build an `InvalidConfiguration` error for `field`
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        CanvasError::InvalidConfiguration {
            field,
            message: Arc::new(message.into()),
        }
    }

    /// Build an `Encode` error for `protocol`
    pub fn encode(protocol: &'static str, message: impl std::fmt::Display) -> Self {
        CanvasError::Encode {
            protocol,
            message: Arc::new(message.to_string()),
        }
    }
}

impl From<image::ImageError> for CanvasError {
    fn from(error: image::ImageError) -> Self {
        CanvasError::ImageDecode(Arc::new(error.to_string()))
    }
}

impl From<toml::de::Error> for CanvasError {
    fn from(error: toml::de::Error) -> Self {
        CanvasError::OptionsParse(Arc::new(error.to_string()))
    }
}

impl From<serde_json::Error> for CanvasError {
    fn from(error: serde_json::Error) -> Self {
        CanvasError::OptionsParse(Arc::new(error.to_string()))
    }
}

impl From<base64::DecodeError> for CanvasError {
    fn from(error: base64::DecodeError) -> Self {
        CanvasError::InvalidDataUrl(Arc::new(error.to_string()))
    }
}
