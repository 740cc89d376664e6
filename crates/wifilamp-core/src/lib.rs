//! # WiFiLamp Core
//!
//! Configuration and error types shared by the WiFiLamp discovery crates.
//!
//! - **Configuration**: [`AppConfig`] with browser, classifier and logging
//!   sections, loadable from YAML with environment overrides.
//! - **Errors**: [`WifilampError`] and [`error::ConfigError`] built with `thiserror`.

pub mod config;
pub mod error;

pub use config::{AppConfig, BrowserConfig, ClassifierConfig, LogFormat, LoggingConfig, PrefixRule};
pub use error::{ConfigError, Result, WifilampError};
