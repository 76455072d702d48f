//! # RigLog Core Library
//!
//! Log manager for an endurance test rig. Two serial devices report on the
//! same machine:
//! - a Controllino PLC (cycle counters, tensioning force, tool phase, alerts)
//! - a current-logging microcontroller (peak motor current)
//!
//! Their line streams are merged into one record per test cycle. Completed
//! records are handed to an upload sink, alerts to a notifier.
//!
//! ## Example
//!
//! ```rust,no_run
//! use riglog_core::{AppConfig, LogManager, SystemSerial};
//! use riglog_core::core::{notify, sink};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let mut manager = LogManager::new(
//!         SystemSerial,
//!         &config,
//!         sink::from_config(&config.sink)?,
//!         notify::from_config(&config.notify)?,
//!     );
//!
//!     manager
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::AppConfig;
pub use crate::core::aggregator::{Aggregator, Effect};
pub use crate::core::device::{DeviceIdentity, DeviceRole};
pub use crate::core::manager::{LogManager, ManagerSettings};
pub use crate::core::notify::{AlertEvent, Notifier};
pub use crate::core::protocol::RigMessage;
pub use crate::core::record::{CompletedRecord, LogRecord};
pub use crate::core::sink::{SinkError, UploadSink};
pub use crate::core::transport::{SerialBackend, SerialConfig, SystemSerial, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
