//! OpenAI Realtime API binding.

mod config;
mod messages;
mod translator;

pub use config::{
    DEFAULT_OPENAI_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, openai_connect_url,
    openai_headers,
};
pub use messages::{ClientEvent, ServerEvent};
pub use translator::OpenAITranslator;
