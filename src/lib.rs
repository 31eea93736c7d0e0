#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod collapse;
pub mod comments;
pub mod config;
pub mod data;
pub mod focus;
pub mod navigator;
pub mod station;
pub mod telemetry;
pub mod thread;
pub mod ui;
pub mod visible;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
