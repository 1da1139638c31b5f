//! Embroidery digitizer: sends a photo of embroidered fabric to an image
//! model and hands back a clean digital blueprint.

pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod prompt;
pub mod server;

pub use config::Config;
pub use controller::{Controller, DigitizedImage, Session, SessionView, UiState};
pub use error::{DigitizerError, Result};
pub use gemini::{DigitizationClient, GeminiClient};
pub use prompt::ClothingPart;
