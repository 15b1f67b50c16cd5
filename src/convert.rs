//! External conversion toolchain.
//!
//! The model transcoding itself is done by two black-box tools driven as
//! subprocesses:
//!
//! 1. `tensorflowjs_converter` parses the staged TF.js layers model and
//!    emits a Keras SavedModel.
//! 2. `tflite_convert` turns the SavedModel into a TFLite flatbuffer.
//!
//! Instead of failing on first use, tool availability is probed explicitly
//! (`<tool> --version`) and reported as a structured status, both at startup
//! and from the `/health` endpoint.

use crate::config::ToolchainConfig;
use crate::staging::Staging;
use crate::ConvertError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Options that shape a single conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Reduce stored weight precision for a smaller model.
    ///
    /// Applies dynamic-range float16 quantization. Full int8 would need a
    /// representative dataset the caller does not provide.
    pub quantize: bool,
}

impl ConvertOptions {
    /// Parse the `quantize` query value the way the browser sends it: any
    /// case-insensitive `"true"` enables quantization, everything else does not.
    pub fn from_query(quantize: Option<&str>) -> Self {
        Self {
            quantize: quantize.is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }
}

/// Probed availability of the two external tools.
///
/// `None` means the tool is not installed (or its probe failed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainStatus {
    /// Version of the TF.js converter (the model loader).
    pub tensorflowjs: Option<String>,
    /// Version of the TFLite converter.
    pub tensorflow: Option<String>,
}

/// Seam between the HTTP surface and the external toolchain, so API tests can
/// run against a stub.
pub trait ModelConverter: Send + Sync {
    /// Convert the staged model, returning the TFLite flatbuffer bytes.
    fn convert<'a>(
        &'a self,
        staged: &'a Staging,
        options: ConvertOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ConvertError>>;

    /// Probe both external tools.
    fn status(&self) -> BoxFuture<'_, ToolchainStatus>;
}

/// Real toolchain that shells out to `tensorflowjs_converter` and
/// `tflite_convert`.
pub struct TfliteToolchain {
    converter_bin: PathBuf,
    tflite_bin: PathBuf,
}

impl TfliteToolchain {
    pub fn new(config: &ToolchainConfig) -> Self {
        Self {
            converter_bin: config.tensorflowjs_converter.clone(),
            tflite_bin: config.tflite_convert.clone(),
        }
    }

    async fn run_convert(
        &self,
        staged: &Staging,
        options: ConvertOptions,
    ) -> Result<Vec<u8>, ConvertError> {
        // Step 1: TF.js layers model -> Keras SavedModel
        let saved_model = staged.saved_model_path();
        let output = Command::new(&self.converter_bin)
            .arg("--input_format=tfjs_layers_model")
            .arg("--output_format=keras_saved_model")
            .arg(staged.model_json_path())
            .arg(&saved_model)
            .output()
            .await
            .map_err(|e| missing_or_io("tensorflowjs_converter", e))?;
        if !output.status.success() {
            return Err(ConvertError::LoadFailed(stderr_message(&output.stderr)));
        }
        info!("Loaded TF.js model into {}", saved_model.display());

        // Step 2: SavedModel -> TFLite flatbuffer
        let tflite_path = staged.tflite_path();
        let mut cmd = Command::new(&self.tflite_bin);
        cmd.arg(format!("--saved_model_dir={}", saved_model.display()))
            .arg(format!("--output_file={}", tflite_path.display()));
        if options.quantize {
            info!("Applying float16 quantization");
            cmd.arg("--post_training_quantize").arg("--quantize_to_float16");
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| missing_or_io("tflite_convert", e))?;
        if !output.status.success() {
            return Err(ConvertError::ConversionFailed(stderr_message(&output.stderr)));
        }

        let bytes = tokio::fs::read(&tflite_path).await?;
        info!("TFLite model size: {} bytes", bytes.len());
        Ok(bytes)
    }
}

impl ModelConverter for TfliteToolchain {
    fn convert<'a>(
        &'a self,
        staged: &'a Staging,
        options: ConvertOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, ConvertError>> {
        self.run_convert(staged, options).boxed()
    }

    fn status(&self) -> BoxFuture<'_, ToolchainStatus> {
        async move {
            ToolchainStatus {
                tensorflowjs: probe_version(&self.converter_bin).await,
                tensorflow: probe_version(&self.tflite_bin).await,
            }
        }
        .boxed()
    }
}

/// Run `<bin> --version` and extract a version string, or `None` when the
/// tool is absent or the probe fails.
pub async fn probe_version(bin: &Path) -> Option<String> {
    let output = Command::new(bin).arg("--version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    parse_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// First non-empty line of a `--version` dump, with a leading tool name
/// stripped (`tensorflowjs 4.17.0` -> `4.17.0`).
pub fn parse_version_output(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let version = match line.rsplit_once(' ') {
        Some((_, last)) if last.chars().next().is_some_and(|c| c.is_ascii_digit()) => last,
        _ => line,
    };
    Some(version.to_string())
}

fn missing_or_io(tool: &str, err: std::io::Error) -> ConvertError {
    if err.kind() == ErrorKind::NotFound {
        ConvertError::MissingDependency(tool.to_string())
    } else {
        ConvertError::Io(err)
    }
}

fn stderr_message(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "external tool exited with a failure status".to_string();
    }
    // Keep the tail: Python tools print the actual error last.
    let lines: Vec<&str> = trimmed.lines().collect();
    lines[lines.len().saturating_sub(5)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_flag_requires_literal_true() {
        assert!(ConvertOptions::from_query(Some("true")).quantize);
        assert!(ConvertOptions::from_query(Some("TRUE")).quantize);
        assert!(ConvertOptions::from_query(Some("True")).quantize);
        assert!(!ConvertOptions::from_query(Some("false")).quantize);
        assert!(!ConvertOptions::from_query(Some("1")).quantize);
        assert!(!ConvertOptions::from_query(Some("")).quantize);
        assert!(!ConvertOptions::from_query(None).quantize);
    }

    #[test]
    fn version_parsing_strips_tool_name() {
        assert_eq!(
            parse_version_output("tensorflowjs 4.17.0\nDependency versions:\n  keras 3.1\n"),
            Some("4.17.0".to_string())
        );
    }

    #[test]
    fn version_parsing_plain_number() {
        assert_eq!(parse_version_output("2.16.1\n"), Some("2.16.1".to_string()));
    }

    #[test]
    fn version_parsing_skips_blank_lines() {
        assert_eq!(
            parse_version_output("\n\n  tflite_convert 2.16.1  \n"),
            Some("2.16.1".to_string())
        );
    }

    #[test]
    fn version_parsing_empty_output() {
        assert_eq!(parse_version_output("   \n"), None);
    }

    #[test]
    fn version_parsing_keeps_non_numeric_suffix_lines() {
        // No trailing version token: report the whole line rather than nothing.
        assert_eq!(
            parse_version_output("converter (unknown build)"),
            Some("converter (unknown build)".to_string())
        );
    }

    #[tokio::test]
    async fn probe_reports_absent_tool_as_none() {
        let missing = Path::new("/nonexistent/tfjs-bridge-no-such-tool");
        assert_eq!(probe_version(missing).await, None);
    }

    #[test]
    fn stderr_message_keeps_the_tail() {
        let stderr = b"Traceback (most recent call last):\n  a\n  b\n  c\n  d\nValueError: bad layer\n";
        let msg = stderr_message(stderr);
        assert!(msg.ends_with("ValueError: bad layer"));
        assert!(!msg.contains("Traceback"));
    }

    #[test]
    fn stderr_message_handles_empty_output() {
        assert!(stderr_message(b"").contains("failure status"));
    }
}
