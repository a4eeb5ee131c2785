//! Signaling statistics

pub mod metrics;

pub use metrics::{SignalingSnapshot, SignalingStats};
