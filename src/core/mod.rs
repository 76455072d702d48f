//! Core module containing the main functionality of RigLog
//!
//! This module provides:
//! - Serial transport with non-blocking line reads
//! - Device discovery by USB identity and per-device link lifecycle
//! - Line protocol decoding
//! - Cycle aggregation into per-cycle records
//! - Upload sinks (local store, realtime database)
//! - Alert notifiers (log, webhook)
//! - The poll loop tying it together
//! - CSV export of stored records

pub mod aggregator;
pub mod device;
pub mod export;
pub mod manager;
pub mod notify;
pub mod protocol;
pub mod record;
pub mod sink;
pub mod transport;
