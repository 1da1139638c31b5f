//! Turns the user's photo into something that fits in a JSON request.

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;

pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// The photo the user picked. At most one is live per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub name: String,
}

impl SourceImage {
    /// Builds a source image, taking the declared media type when it is an
    /// `image/*` type and sniffing the bytes otherwise.
    pub fn new(bytes: Vec<u8>, declared_type: Option<&str>, name: impl Into<String>) -> Self {
        let media_type = declared_type
            .map(str::trim)
            .filter(|value| value.starts_with("image/"))
            .map(str::to_string)
            .unwrap_or_else(|| sniff_media_type(&bytes).to_string());
        Self {
            bytes,
            media_type,
            name: name.into(),
        }
    }

    #[cfg(test)]
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(bytes, None, name))
    }
}

/// Base64 text of a source image plus its media type. Computed per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub data: String,
    pub media_type: String,
}

pub fn encode(source: &SourceImage) -> EncodedPayload {
    EncodedPayload {
        data: general_purpose::STANDARD.encode(&source.bytes),
        media_type: source.media_type.clone(),
    }
}

pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => FALLBACK_MEDIA_TYPE,
    }
}

pub fn to_data_uri(media_type: &str, base64_data: &str) -> String {
    format!("data:{media_type};base64,{base64_data}")
}

/// Drops a leading `data:<type>;base64,` if present.
pub fn strip_data_uri_prefix(value: &str) -> &str {
    if value.starts_with("data:") {
        if let Some((_, rest)) = value.split_once(',') {
            return rest;
        }
    }
    value
}
