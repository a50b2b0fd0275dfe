//! Clients for the generative AI collaborators.
//!
//! - Hook, caption and hashtag text via Gemini `generateContent`
//! - Per-segment images via Imagen, implementing `ImageGenerator`
//! - Text-to-video via Veo long-running operations, implementing `VideoGenerator`

pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod images;
pub mod video;

pub use client::GeminiClient;
pub use config::AiConfig;
pub use error::{AiError, AiResult};
pub use hooks::{HookGenerator, HookSet};
