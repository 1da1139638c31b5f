use thiserror::Error;

pub type Result<T, E = DigitizerError> = std::result::Result<T, E>;

pub const FALLBACK_MESSAGE: &str = "An unknown error occurred.";

/// Failures a digitize cycle (or startup) can run into.
///
/// The `Display` text of each variant is what the browser shows. Remote
/// failure details stay out of it and only reach the log.
#[derive(Debug, Error)]
pub enum DigitizerError {
    #[error("{0}")]
    Validation(String),
    #[error("Failed to read the source image: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to digitize embroidery. Please check the server logs for details.")]
    RemoteCall { detail: String },
    #[error("The model did not return an image.")]
    NoImageReturned,
    #[error("A digitize request is already in progress.")]
    Busy,
    #[error("The source image changed while digitizing; that result was discarded.")]
    Superseded,
    #[error("The image is too large to upload.")]
    UploadTooLarge,
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DigitizerError {
    pub fn remote(detail: impl Into<String>) -> Self {
        Self::RemoteCall {
            detail: detail.into(),
        }
    }

    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        }
    }
}
