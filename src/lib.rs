//! # tflite-bridge
//!
//! HTTP bridge between a browser-based model trainer and an embedded
//! inference device: accepts a TensorFlow.js artifact pair (topology JSON +
//! binary weight blob) over a multipart upload and returns the model
//! re-encoded as a TFLite flatbuffer, optionally with reduced precision.
//!
//! The graph parsing, tensor reconstruction, and quantization arithmetic all
//! happen inside two external conversion tools (`tensorflowjs_converter` and
//! `tflite_convert`); this crate stages the uploads, patches the weight
//! manifest so file references resolve, drives the tools, and streams the
//! result back.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! tflite-bridge serve --port 5000
//!
//! # Convert a model
//! curl -F model_json=@model.json -F weights_bin=@weights.bin \
//!     "http://localhost:5000/convert?quantize=true" -o model.tflite
//! ```

pub mod api;
pub mod config;
pub mod convert;
pub mod manifest;
pub mod staging;

// Re-exports
pub use api::{routes, handle_rejection};
pub use config::Config;
pub use convert::{ConvertOptions, ModelConverter, TfliteToolchain, ToolchainStatus};
pub use staging::Staging;

/// Errors that can occur while servicing a conversion request.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Missing {0} file")]
    MissingPart(&'static str),

    #[error("Invalid model topology: {0}")]
    InvalidTopology(String),

    #[error("Missing dependency: {0}. Install with: pip install tensorflow tensorflowjs")]
    MissingDependency(String),

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Scratch storage error: {0}")]
    Io(#[from] std::io::Error),
}
