//! Transports for static DICOMweb sources.
//!
//! A static source serves precomputed JSON files, e.g. from object storage behind a CDN.
//! It ignores query parameters and content negotiation, so searches are evaluated on the
//! client and binary responses are never trusted to be labeled correctly.

use crate::api::qido::{filter_records, FieldAliases, QidoService, QueryParameters, SearchRequest};
use crate::api::wado::{BulkDataRequest, FramesRequest, MetadataRequest, WadoService};
use crate::backend::dicomweb::{DicomWebQidoService, DicomWebWadoService};
use crate::backend::ClientError;
use crate::dataset::Dataset;
use crate::utils::multipart::repair;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::{debug, instrument};

pub struct StaticQidoService {
	inner: DicomWebQidoService,
}

impl StaticQidoService {
	pub const fn new(inner: DicomWebQidoService) -> Self {
		Self { inner }
	}
}

#[async_trait]
impl QidoService for StaticQidoService {
	#[instrument(skip_all, fields(source = %self.inner.source().name, level = %request.query.level))]
	async fn search(&self, request: SearchRequest, headers: &HeaderMap) -> Result<Vec<Dataset>, ClientError> {
		let SearchRequest { query, parameters } = request;
		let QueryParameters {
			match_criteria,
			limit,
			offset,
			..
		} = parameters;

		// Static sources do not understand query parameters. Paging happens after filtering.
		let unfiltered = SearchRequest {
			query: query.clone(),
			parameters: QueryParameters::default(),
		};
		let records = self.inner.search(unfiltered, headers).await?;
		let total = records.len();

		let aliases = FieldAliases::for_level(query.level);
		let matching = filter_records(records, &match_criteria, &aliases);
		debug!(total, matching = matching.len(), "Filtered static search results");

		Ok(matching
			.into_iter()
			.skip(offset)
			.take(limit.unwrap_or(usize::MAX))
			.collect())
	}
}

pub struct StaticWadoService {
	inner: DicomWebWadoService,
}

impl StaticWadoService {
	pub const fn new(inner: DicomWebWadoService) -> Self {
		Self { inner }
	}
}

#[async_trait]
impl WadoService for StaticWadoService {
	async fn retrieve_metadata(
		&self,
		request: MetadataRequest,
		headers: &HeaderMap,
	) -> Result<Vec<Dataset>, ClientError> {
		self.inner.retrieve_metadata(request, headers).await
	}

	/// Static sources store one frame per file, so the response is a single part.
	async fn retrieve_frames(&self, request: FramesRequest, headers: &HeaderMap) -> Result<Vec<Bytes>, ClientError> {
		let response = self
			.inner
			.fetch(&self.inner.frames_url(&request), headers.clone())
			.await?;
		Ok(vec![repair(response.body)])
	}

	async fn retrieve_bulk_data(&self, request: BulkDataRequest, headers: &HeaderMap) -> Result<Bytes, ClientError> {
		let url = self.inner.bulk_data_url(&request)?;
		let response = self
			.inner
			.fetch(&url, DicomWebWadoService::bulk_data_headers(&request, headers))
			.await?;
		Ok(repair(response.body))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::api::qido::{QuerySpec, ResourceQuery};
	use crate::api::wado::InstanceUids;
	use crate::config::SourceConfig;
	use serde_json::json;
	use std::sync::Arc;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn source(server: &MockServer) -> Arc<SourceConfig> {
		let root = format!("{}/static", server.uri());
		Arc::new(SourceConfig {
			is_static: true,
			..SourceConfig::new("static", root.clone(), root)
		})
	}

	async fn studies_server() -> MockServer {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/static/studies"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				{ "0020000D": { "vr": "UI", "Value": ["1"] }, "00081030": { "vr": "LO", "Value": ["Chest CT"] } },
				{ "0020000D": { "vr": "UI", "Value": ["2"] }, "00081030": { "vr": "LO", "Value": ["Head MR"] } },
				{ "0020000D": { "vr": "UI", "Value": ["3"] }, "00081030": { "vr": "LO", "Value": ["Chest X-Ray"] } },
				{ "0020000D": { "vr": "UI", "Value": ["4"] }, "00081030": { "vr": "LO", "Value": ["chest follow-up"] } }
			])))
			.mount(&server)
			.await;
		server
	}

	fn uids(records: &[Dataset]) -> Vec<&str> {
		records
			.iter()
			.filter_map(|record| record.get_key("0020000D")?.first_value()?.as_str())
			.collect()
	}

	#[tokio::test]
	async fn filters_on_the_client() {
		let server = studies_server().await;
		let service = StaticQidoService::new(DicomWebQidoService::new(reqwest::Client::new(), source(&server)));

		let request = SearchRequest {
			query: ResourceQuery::studies(),
			parameters: QueryParameters {
				match_criteria: QuerySpec::new().with("StudyDescription", "chest*"),
				..QueryParameters::default()
			},
		};
		let records = service.search(request, &HeaderMap::new()).await.unwrap();
		assert_eq!(uids(&records), vec!["1", "3", "4"]);
	}

	#[tokio::test]
	async fn pages_after_filtering() {
		let server = studies_server().await;
		let service = StaticQidoService::new(DicomWebQidoService::new(reqwest::Client::new(), source(&server)));

		let request = SearchRequest {
			query: ResourceQuery::studies(),
			parameters: QueryParameters {
				match_criteria: QuerySpec::new().with("StudyDescription", "chest*"),
				limit: Some(1),
				offset: 1,
				..QueryParameters::default()
			},
		};
		let records = service.search(request, &HeaderMap::new()).await.unwrap();
		assert_eq!(uids(&records), vec!["3"]);
	}

	#[tokio::test]
	async fn frames_are_always_repaired() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/static/studies/1/series/2/instances/3/frames/1"))
			.respond_with(ResponseTemplate::new(200).set_body_raw(
				b"--xyz\r\nContent-Type: image/jp2\r\n\r\nframe bytes\r\n--xyz--".to_vec(),
				"multipart/related; boundary=other",
			))
			.mount(&server)
			.await;

		let service = StaticWadoService::new(DicomWebWadoService::new(reqwest::Client::new(), source(&server)));
		let request = FramesRequest {
			instance: InstanceUids {
				study_instance_uid: String::from("1"),
				series_instance_uid: String::from("2"),
				sop_instance_uid: String::from("3"),
			},
			frames: vec![1],
		};
		let frames = service.retrieve_frames(request, &HeaderMap::new()).await.unwrap();
		assert_eq!(frames, vec![Bytes::from_static(b"frame bytes")]);
	}
}
