//! Adapters for the external services the pipelines call.

pub mod images;
pub mod notifier;
pub mod stt;
pub mod tts;

pub use images::{HttpImageProvider, ImageChain, ImageProvider, PollinationsProvider};
pub use notifier::{escape_html, NoopNotifier, Notifier, TelegramCredentials, TelegramNotifier};
pub use stt::{parse_whisper_json, Transcriber, WhisperCli};
pub use tts::{split_into_chunks, HttpTtsEngine, TtsEngine};
