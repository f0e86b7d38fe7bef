//! Prometheus exporter for Rainforest RAVEn smart meter telemetry.
//!
//! The RAVEn radio stick streams XML fragments over a USB serial link.
//! This crate frames two fragment kinds out of that stream, converts
//! their hex-encoded readings into watts and watt-hours, and serves the
//! results as Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Serial port  │────>│    Pipeline     │────>│  MeterMetrics   │
//! │ (XML stream) │     │ (frame/decode)  │     │   (registry)    │
//! └──────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                       │
//!                                              ┌────────▼────────┐
//!                                              │   HTTP Server   │
//!                                              │   (/metrics)    │
//!                                              └─────────────────┘
//! ```
//!
//! Any stream, framing, parse, or conversion fault is fatal: the wire
//! protocol has no resynchronization marker, so the pipeline reports the
//! error upward and the process exits instead of skipping forward.

pub mod config;
pub mod convert;
pub mod error;
pub mod http;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod scanner;
pub mod serial;

pub use config::ExporterConfig;
pub use error::PipelineError;
pub use http::HttpServer;
pub use message::{CurrentSummationDelivered, InstantaneousDemand, MessageKind, RavenMessage};
pub use metrics::{MeterMetrics, SharedMetrics};
pub use pipeline::Pipeline;
pub use scanner::XmlScanner;
