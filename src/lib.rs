mod page;
mod routes;

pub mod app;
pub mod candidate;
pub mod client;
pub mod config;
pub mod detection;
pub mod notification;
pub mod preview;
pub mod render;
pub mod server;
pub mod telemetry;
pub mod upload;

pub use app::start_app;
pub use client::{DetectionClient, DetectionError, Detector};
pub use upload::{UploadPhase, UploadSession};
