//! Workspace umbrella crate for notekeeper.
//!
//! Stitches configuration, logging and the notes domain together so a front
//! end only needs [`AppConfig::load`], [`init_logging`] and a
//! [`NotesClient`]. The resilience primitives live in [`resilience`] and the
//! domain in [`notes`]; both are re-exported.

pub mod client;
pub mod config;
pub mod logging;

pub use client::{FailurePresenter, NotesClient};
pub use config::{
    AppConfig, ConfigLoadError, EventsConfig, LogFormat, LoggingConfig, CONFIG_PATH_ENV,
};
pub use logging::{init_logging, LoggingError};

pub use notes;
pub use resilience;
