use super::{content_type, get, json_headers, read_body, read_datasets};
use crate::api::wado::{BulkDataRequest, FramesRequest, MetadataRequest, WadoService};
use crate::backend::ClientError;
use crate::config::SourceConfig;
use crate::dataset::{resolve_bulk_data_uri, Dataset};
use crate::utils::multipart::decode_parts;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::sync::Arc;
use tracing::{instrument, trace, warn};
use url::Url;

/// Retrieves metadata, frames and bulk data from the WADO-RS endpoint of a source.
pub struct DicomWebWadoService {
	http: reqwest::Client,
	source: Arc<SourceConfig>,
}

/// A binary response before it is split into parts.
pub struct RawResponse {
	pub content_type: Option<String>,
	pub body: Bytes,
}

impl DicomWebWadoService {
	pub const fn new(http: reqwest::Client, source: Arc<SourceConfig>) -> Self {
		Self { http, source }
	}

	pub fn source(&self) -> &SourceConfig {
		&self.source
	}

	pub(crate) async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<RawResponse, ClientError> {
		let response = get(&self.http, url, headers, &[]).await?;
		let content_type = content_type(&response);
		let body = read_body(url, response).await?;
		trace!(url, content_type = ?content_type, bytes = body.len(), "Read binary response");
		Ok(RawResponse { content_type, body })
	}

	pub(crate) fn frames_url(&self, request: &FramesRequest) -> String {
		format!("{}/{}", self.source.retrieval_root(), request.path())
	}

	/// Resolves the bulk data URI against this source. Only absolute URLs can be fetched.
	pub(crate) fn bulk_data_url(&self, request: &BulkDataRequest) -> Result<String, ClientError> {
		let mut uri = request.uri.clone();
		resolve_bulk_data_uri(&mut uri, &request.instance, &self.source);
		match Url::parse(&uri) {
			Ok(_) => Ok(uri),
			Err(_) => Err(ClientError::UnresolvedBulkData { uri }),
		}
	}

	/// The retrieval headers, preferring `media_type` if the caller asked for one.
	pub(crate) fn bulk_data_headers(request: &BulkDataRequest, headers: &HeaderMap) -> HeaderMap {
		let mut headers = headers.clone();
		if let Some(media_type) = &request.media_type {
			match HeaderValue::from_str(&format!("{media_type}, application/octet-stream")) {
				Ok(accept) => {
					headers.insert(ACCEPT, accept);
				}
				Err(err) => warn!(media_type, "Ignoring invalid bulk data media type: {err}"),
			}
		}
		headers
	}
}

/// The first non-empty part, as there is exactly one bulk data item per URI.
pub(crate) fn first_part(parts: Vec<Bytes>) -> Bytes {
	parts
		.into_iter()
		.find(|part| !part.is_empty())
		.unwrap_or_default()
}

#[async_trait]
impl WadoService for DicomWebWadoService {
	#[instrument(skip_all, fields(source = %self.source.name, study = %request.study_instance_uid))]
	async fn retrieve_metadata(
		&self,
		request: MetadataRequest,
		headers: &HeaderMap,
	) -> Result<Vec<Dataset>, ClientError> {
		let url = format!("{}/{}", self.source.retrieval_root(), request.path());
		let response = get(&self.http, &url, json_headers(headers), &[]).await?;
		read_datasets(&url, response).await
	}

	#[instrument(skip_all, fields(source = %self.source.name, instance = %request.instance.sop_instance_uid))]
	async fn retrieve_frames(&self, request: FramesRequest, headers: &HeaderMap) -> Result<Vec<Bytes>, ClientError> {
		let response = self.fetch(&self.frames_url(&request), headers.clone()).await?;
		Ok(decode_parts(response.content_type.as_deref(), response.body).await)
	}

	#[instrument(skip_all, fields(source = %self.source.name))]
	async fn retrieve_bulk_data(&self, request: BulkDataRequest, headers: &HeaderMap) -> Result<Bytes, ClientError> {
		let url = self.bulk_data_url(&request)?;
		let response = self
			.fetch(&url, Self::bulk_data_headers(&request, headers))
			.await?;
		let parts = decode_parts(response.content_type.as_deref(), response.body).await;
		Ok(first_part(parts))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::InstanceContext;
	use crate::api::wado::InstanceUids;
	use serde_json::json;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn service(server: &MockServer) -> DicomWebWadoService {
		let root = format!("{}/dicomweb", server.uri());
		DicomWebWadoService::new(
			reqwest::Client::new(),
			Arc::new(SourceConfig::new("pacs", root.clone(), root)),
		)
	}

	fn multipart(boundary: &str, parts: &[&[u8]]) -> Vec<u8> {
		let mut buf = Vec::new();
		for part in parts {
			buf.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes());
			buf.extend_from_slice(part);
			buf.extend_from_slice(b"\r\n");
		}
		buf.extend_from_slice(format!("--{boundary}--").as_bytes());
		buf
	}

	fn frames(frames: Vec<u32>) -> FramesRequest {
		FramesRequest {
			instance: InstanceUids {
				study_instance_uid: String::from("1"),
				series_instance_uid: String::from("2"),
				sop_instance_uid: String::from("3"),
			},
			frames,
		}
	}

	#[tokio::test]
	async fn retrieve_study_metadata() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/dicomweb/studies/1/metadata"))
			.and(header("accept", "application/dicom+json"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				{ "0020000E": { "vr": "UI", "Value": ["2"] } }
			])))
			.mount(&server)
			.await;

		let metadata = service(&server)
			.retrieve_metadata(MetadataRequest::study("1"), &HeaderMap::new())
			.await
			.unwrap();
		assert_eq!(metadata.len(), 1);
	}

	#[tokio::test]
	async fn retrieve_multipart_frames() {
		let server = MockServer::start().await;
		let body = multipart("frames", &[b"first frame", b"second frame"]);
		Mock::given(method("GET"))
			.and(path("/dicomweb/studies/1/series/2/instances/3/frames/1,2"))
			.respond_with(ResponseTemplate::new(200).set_body_raw(
				body,
				"multipart/related; type=\"application/octet-stream\"; boundary=frames",
			))
			.mount(&server)
			.await;

		let frames = service(&server)
			.retrieve_frames(frames(vec![1, 2]), &HeaderMap::new())
			.await
			.unwrap();
		assert_eq!(frames, vec![Bytes::from_static(b"first frame"), Bytes::from_static(b"second frame")]);
	}

	#[tokio::test]
	async fn retrieve_mislabeled_frame() {
		let server = MockServer::start().await;
		let body = multipart("BOUNDARY", &[b"pixel data of the frame"]);
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/octet-stream"))
			.mount(&server)
			.await;

		let frames = service(&server)
			.retrieve_frames(frames(vec![1]), &HeaderMap::new())
			.await
			.unwrap();
		assert_eq!(frames, vec![Bytes::from_static(b"pixel data of the frame")]);
	}

	#[tokio::test]
	async fn retrieve_relative_bulk_data() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/dicomweb/studies/1/series/2/bulk/7"))
			.respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"))
			.mount(&server)
			.await;

		let request = BulkDataRequest {
			uri: String::from("bulk/7"),
			instance: InstanceContext::new("1", Some(String::from("2"))),
			media_type: Some(String::from("application/pdf")),
		};
		let data = service(&server)
			.retrieve_bulk_data(request, &HeaderMap::new())
			.await
			.unwrap();
		assert_eq!(data, Bytes::from_static(b"%PDF-1.7"));
	}

	#[tokio::test]
	async fn unresolvable_bulk_data_is_an_error() {
		let server = MockServer::start().await;
		let request = BulkDataRequest {
			uri: String::from("bulk/7"),
			instance: InstanceContext::default(),
			media_type: None,
		};
		let result = service(&server).retrieve_bulk_data(request, &HeaderMap::new()).await;
		assert!(matches!(result, Err(ClientError::UnresolvedBulkData { uri }) if uri == "bulk/7"));
	}

	#[test]
	fn bulk_data_media_type_overrides_accept() {
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
		let request = BulkDataRequest {
			uri: String::from("bulk/7"),
			instance: InstanceContext::default(),
			media_type: Some(String::from("video/mp4")),
		};

		let headers = DicomWebWadoService::bulk_data_headers(&request, &headers);
		assert_eq!(headers.get(ACCEPT).unwrap(), "video/mp4, application/octet-stream");
	}

	#[test]
	fn first_non_empty_part() {
		let parts = vec![Bytes::new(), Bytes::from_static(b"data"), Bytes::from_static(b"more")];
		assert_eq!(first_part(parts), Bytes::from_static(b"data"));
		assert_eq!(first_part(Vec::new()), Bytes::new());
	}
}
