//! vrm-viewer - single-window VRM avatar viewer
//!
//! Loads a VRM (glTF binary) model asynchronously, normalizes it to unit size
//! and frames it with the camera, plays its first animation clip, and renders
//! it continuously with orbit camera controls.

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod scene;
pub mod viewer;

#[cfg(feature = "native-ui")]
pub mod ui;

pub use config::Config;
pub use error::{Result, ViewerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
