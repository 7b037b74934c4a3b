//! The standard DICOMweb transport over HTTP.

mod qido;
mod wado;

pub use qido::DicomWebQidoService;
pub use wado::DicomWebWadoService;

use super::ClientError;
use crate::dataset::Dataset;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use tracing::{debug, trace};

pub const DICOM_JSON: &str = "application/dicom+json";

/// Sends a GET request and fails on non-success status codes.
async fn get(
	http: &reqwest::Client,
	url: &str,
	headers: HeaderMap,
	query: &[(String, String)],
) -> Result<Response, ClientError> {
	trace!(url, ?query, "Sending request");
	let response = http
		.get(url)
		.headers(headers)
		.query(query)
		.send()
		.await
		.map_err(|source| ClientError::Http {
			url: url.to_owned(),
			source,
		})?;

	let status = response.status();
	debug!(url, %status, "Received response");
	if status.is_success() {
		Ok(response)
	} else {
		Err(ClientError::Status {
			url: url.to_owned(),
			status,
		})
	}
}

/// Reads a DICOM-JSON array. `204 No Content` and an empty body are an empty result.
async fn read_datasets(url: &str, response: Response) -> Result<Vec<Dataset>, ClientError> {
	if response.status() == StatusCode::NO_CONTENT {
		return Ok(Vec::new());
	}

	let body = read_body(url, response).await?;
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(Vec::new());
	}

	serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
		url: url.to_owned(),
		source,
	})
}

async fn read_body(url: &str, response: Response) -> Result<bytes::Bytes, ClientError> {
	response.bytes().await.map_err(|source| ClientError::Http {
		url: url.to_owned(),
		source,
	})
}

fn content_type(response: &Response) -> Option<String> {
	response
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.map(str::to_owned)
}

/// Returns a copy of `headers` that asks for DICOM-JSON.
fn json_headers(headers: &HeaderMap) -> HeaderMap {
	let mut headers = headers.clone();
	headers.insert(ACCEPT, HeaderValue::from_static(DICOM_JSON));
	headers
}
