use super::{get, json_headers, read_datasets};
use crate::api::qido::{QidoService, SearchRequest};
use crate::backend::ClientError;
use crate::config::SourceConfig;
use crate::dataset::Dataset;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Runs searches against the QIDO-RS endpoint of a source. Query evaluation is left to
/// the server.
pub struct DicomWebQidoService {
	http: reqwest::Client,
	source: Arc<SourceConfig>,
}

impl DicomWebQidoService {
	pub const fn new(http: reqwest::Client, source: Arc<SourceConfig>) -> Self {
		Self { http, source }
	}

	pub fn source(&self) -> &SourceConfig {
		&self.source
	}
}

#[async_trait]
impl QidoService for DicomWebQidoService {
	#[instrument(skip_all, fields(source = %self.source.name, level = %request.query.level))]
	async fn search(&self, request: SearchRequest, headers: &HeaderMap) -> Result<Vec<Dataset>, ClientError> {
		let url = format!("{}/{}", self.source.query_root(), request.query.path());
		let query = request.parameters.to_query_pairs();

		let response = get(&self.http, &url, json_headers(headers), &query).await?;
		let records = read_datasets(&url, response).await?;

		trace!(records = records.len(), "Search completed");
		Ok(records)
	}
}
