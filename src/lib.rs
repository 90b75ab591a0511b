pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod geometry;
pub mod patient;
pub mod pipeline;
pub mod pose;
pub mod recorder;
pub mod runtime;
pub mod tilt;

pub use error::{MonitorError, MonitorResult};
