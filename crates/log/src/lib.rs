#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge Log
//!
//! Subscriber setup for Converge binaries. Libraries only emit through
//! `tracing`; a binary picks a [`Config`] (usually [`Config::from_env`]) and
//! calls [`init`] once at startup.
//!
//! ```no_run
//! let config = converge_log::Config::from_env();
//! converge_log::init(&config).expect("logger");
//! tracing::info!("ready");
//! ```

mod builder;
mod config;
mod error;

pub use builder::{init, try_init};
pub use config::{Config, Format};
pub use error::LogError;
