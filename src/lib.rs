//! LINE Zombie Bot Library
//!
//! A webhook receiver for the LINE Messaging API that verifies, decodes and
//! answers inbound event batches.
//!
//! # Architecture
//!
//! ```text
//! LINE Platform ──HTTPS──▶ /api/ (this) ──REST──▶ LINE Messaging API
//!                            │
//!                            ├── Signature check (X-Line-Signature)
//!                            ├── Dispatcher ──▶ Composer ──▶ Media cache
//!                            └── /images/* (downloaded media, previews)
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Set environment variables
//! export CHANNEL_ACCESS_TOKEN=your_token
//! export CHANNEL_SECRET=your_secret
//! export USE_REAL_ENVIRONMENT=true               # production API
//! export PUBLIC_BASE_URL=https://bot.example.com # where /images is reachable
//!
//! # Run
//! line-zombie-bot
//! ```
//!
//! Text triggers, checked in order: `imagemap`, `goodbye`, `i want to explode`,
//! `find zombie`, `multizombie`. Anything else is echoed back.

pub mod composer;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod line_api;
pub mod media_cache;
pub mod types;
pub mod webhook;

pub use composer::{Composer, Reaction};
pub use config::BotConfig;
pub use crypto::LineSignature;
pub use dispatcher::{BatchReport, DispatchOutcome, Dispatcher};
pub use error::{BotError, BotResult};
pub use line_api::LineApiClient;
pub use media_cache::{DiskMediaStore, MediaStore, MemoryMediaStore};

/// Prelude for common imports
pub mod prelude {
    pub use crate::composer::{Composer, Reaction};
    pub use crate::config::BotConfig;
    pub use crate::dispatcher::{DispatchOutcome, Dispatcher};
    pub use crate::error::{BotError, BotResult};
    pub use crate::line_api::LineApiClient;
    pub use crate::media_cache::{MediaKind, MediaStore};
    pub use crate::types::*;
}
