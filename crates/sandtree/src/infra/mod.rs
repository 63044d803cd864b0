//! Infrastructure adapters: sandbox runtime, template storage, config and logging.

pub mod config;
pub mod logging;
pub mod runtime;
pub mod sandbox;
pub mod templates;
