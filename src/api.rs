//! HTTP routes (warp-based).
//!
//! Two endpoints: `POST /convert` takes the multipart artifact pair and
//! streams back the TFLite flatbuffer as an attachment, `GET /health` reports
//! the probed toolchain versions. Failures are JSON `{"error": ...}` bodies.
//! CORS is wide open because the caller is a browser-based trainer on a
//! different origin.

use crate::convert::{ConvertOptions, ModelConverter};
use crate::manifest;
use crate::staging::Staging;
use crate::ConvertError;
use bytes::BufMut;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::{HeaderValue, StatusCode};
use warp::multipart::{FormData, Part};
use warp::{Filter, Rejection, Reply};

/// Query parameters accepted by the convert endpoint.
#[derive(Debug, Deserialize)]
struct ConvertQuery {
    quantize: Option<String>,
}

/// Build the `/convert` and `/health` routes.
pub fn routes(
    converter: Arc<dyn ModelConverter>,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let convert = warp::path("convert")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<ConvertQuery>())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and(with_converter(converter.clone()))
        .and_then(handle_convert);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_converter(converter))
        .and_then(handle_health);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    convert.or(health).with(cors)
}

fn with_converter(
    converter: Arc<dyn ModelConverter>,
) -> impl Filter<Extract = (Arc<dyn ModelConverter>,), Error = Infallible> + Clone {
    warp::any().map(move || converter.clone())
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_convert(
    query: ConvertQuery,
    form: FormData,
    converter: Arc<dyn ModelConverter>,
) -> Result<impl Reply, Infallible> {
    let options = ConvertOptions::from_query(query.quantize.as_deref());
    match run_convert(form, options, converter).await {
        Ok(bytes) => Ok(tflite_response(bytes)),
        Err(e) => {
            tracing::error!("Conversion request failed: {}", e);
            Ok(convert_error_response(&e))
        }
    }
}

async fn run_convert(
    form: FormData,
    options: ConvertOptions,
    converter: Arc<dyn ModelConverter>,
) -> Result<Vec<u8>, ConvertError> {
    let upload = read_form(form).await?;
    let model_json = upload
        .model_json
        .ok_or(ConvertError::MissingPart("model_json"))?;
    let weights = upload
        .weights_bin
        .ok_or(ConvertError::MissingPart("weights_bin"))?;

    // Metadata is accepted but does not affect the output; malformed
    // metadata must not abort the request.
    let metadata = manifest::parse_metadata(upload.metadata.as_deref().unwrap_or("{}"));
    if let Some(classes) = metadata.get("classes").and_then(|c| c.as_array()) {
        info!("Metadata: {} classes", classes.len());
    }

    let (patched, summary) = manifest::patch_weights_manifest(&model_json)?;

    // Scratch directory lives exactly as long as this function.
    let staging = Staging::create()?;
    staging.write_inputs(&patched, &weights).await?;
    info!(
        "Loading TF.js model from {} (format: {}, {} manifest groups, weights: {} bytes, quantize: {})",
        staging.path().display(),
        summary.format.as_deref().unwrap_or("unknown"),
        summary.manifest_groups,
        weights.len(),
        options.quantize,
    );

    converter.convert(&staging, options).await
}

async fn handle_health(converter: Arc<dyn ModelConverter>) -> Result<impl Reply, Infallible> {
    let status = converter.status().await;
    let response = serde_json::json!({
        "status": "ok",
        "server": "tfjs-to-tflite-converter",
        "tensorflowjs": dependency_field(&status.tensorflowjs),
        "tensorflow": dependency_field(&status.tensorflow),
    });
    Ok(warp::reply::json(&response))
}

fn dependency_field(version: &Option<String>) -> String {
    version
        .clone()
        .unwrap_or_else(|| "not installed".to_string())
}

// =============================================================================
// Multipart handling
// =============================================================================

#[derive(Default)]
struct Upload {
    model_json: Option<Vec<u8>>,
    weights_bin: Option<Vec<u8>>,
    metadata: Option<String>,
}

async fn read_form(mut form: FormData) -> Result<Upload, ConvertError> {
    let mut upload = Upload::default();
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| ConvertError::Upload(e.to_string()))?
    {
        let name = part.name().to_string();
        let data = part_bytes(part).await?;
        match name.as_str() {
            "model_json" => upload.model_json = Some(data),
            "weights_bin" => upload.weights_bin = Some(data),
            "metadata" => upload.metadata = Some(String::from_utf8_lossy(&data).into_owned()),
            // Unknown parts are ignored, not rejected.
            other => tracing::debug!("Ignoring unknown form part '{}'", other),
        }
    }
    Ok(upload)
}

async fn part_bytes(part: Part) -> Result<Vec<u8>, ConvertError> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, buf| async move {
            acc.put(buf);
            Ok(acc)
        })
        .await
        .map_err(|e| ConvertError::Upload(e.to_string()))
}

// =============================================================================
// Replies
// =============================================================================

fn tflite_response(bytes: Vec<u8>) -> warp::reply::Response {
    let mut response = warp::reply::Response::new(bytes.into());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    response.headers_mut().insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"model.tflite\""),
    );
    response
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn convert_error_response(err: &ConvertError) -> warp::reply::Response {
    let status = match err {
        ConvertError::MissingPart(_)
        | ConvertError::InvalidTopology(_)
        | ConvertError::Upload(_) => StatusCode::BAD_REQUEST,
        ConvertError::MissingDependency(_)
        | ConvertError::LoadFailed(_)
        | ConvertError::ConversionFailed(_)
        | ConvertError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

/// Handle warp rejections with specific HTTP status codes and messages.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        Ok(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request payload too large",
        ))
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        Ok(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid query parameters",
        ))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        Ok(error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a multipart/form-data body",
        ))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        Ok(error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ))
    } else if err.is_not_found() {
        Ok(error_response(StatusCode::NOT_FOUND, "Not found"))
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        Ok(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
        ))
    }
}
