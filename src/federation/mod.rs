//! Fan-out of queries and metadata retrievals to every registered source.

mod merge;

pub use merge::*;

use crate::api::qido::{map_params, QueryParameters, ResourceQuery, SearchRequest, StudySearchParameters};
use crate::api::wado::MetadataRequest;
use crate::backend::ClientError;
use crate::config::{FederationConfig, SourceConfig};
use crate::dataset::{Dataset, NormalizeContext};
use crate::registry::{ClientRegistry, PreparedClient};
use crate::types::QueryLevel;
use dicom::dictionary_std::tags;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// A source whose query failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
	pub source: String,
	pub reason: String,
}

impl SourceFailure {
	pub fn new(source: String, err: &ClientError) -> Self {
		Self {
			source,
			reason: err.to_string(),
		}
	}
}

/// Merged records of a federated search.
#[derive(Debug, Clone, Default)]
pub struct FederatedResult {
	pub records: Vec<Dataset>,
	/// Sources that did not contribute because their query failed.
	pub failed_sources: Vec<SourceFailure>,
}

impl FederatedResult {
	/// Returns `true` if at least one source failed, so `records` may be incomplete.
	pub fn is_partial(&self) -> bool {
		!self.failed_sources.is_empty()
	}
}

/// An instance of a federated study metadata retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMetadata {
	/// The name of the source the instance is retrieved from.
	pub source: String,
	pub dataset: Dataset,
}

#[derive(Debug, Clone, Default)]
pub struct FederatedMetadata {
	pub instances: Vec<InstanceMetadata>,
	pub failed_sources: Vec<SourceFailure>,
}

impl FederatedMetadata {
	pub fn is_partial(&self) -> bool {
		!self.failed_sources.is_empty()
	}
}

/// Runs queries against all sources concurrently and merges the results.
///
/// Every source gets its own timeout. A source that fails or times out contributes no
/// records; the others are never cancelled because of it.
#[derive(Debug, Clone)]
pub struct FederatedQueryExecutor {
	query_timeout: Duration,
	aggregate_counts: bool,
	secure_origin: bool,
}

impl FederatedQueryExecutor {
	pub const fn new(config: &FederationConfig) -> Self {
		Self {
			query_timeout: config.query_timeout(),
			aggregate_counts: config.aggregate_counts,
			secure_origin: config.secure_origin,
		}
	}

	/// Issues `query_fn` for every client and merges the results by the identity of `level`.
	pub async fn search<F, Fut>(&self, clients: Vec<PreparedClient>, level: QueryLevel, query_fn: F) -> FederatedResult
	where
		F: Fn(PreparedClient) -> Fut,
		Fut: Future<Output = Result<Vec<Dataset>, ClientError>>,
	{
		let outcomes = self.settle_all(clients, query_fn).await;
		let result = merge(outcomes, level, self.aggregate_counts);
		debug!(
			records = result.records.len(),
			failed = result.failed_sources.len(),
			"Merged federated results"
		);
		result
	}

	/// Searches studies on every source. Criteria are adapted to each source's
	/// capabilities and the results are normalized with the source as context.
	#[instrument(skip_all)]
	pub async fn search_studies(&self, registry: &ClientRegistry, params: &StudySearchParameters) -> FederatedResult {
		let secure_origin = self.secure_origin;
		self.search(registry.query_clients(), QueryLevel::Study, |client| async move {
			let request = SearchRequest {
				query: ResourceQuery::studies(),
				parameters: map_params(params, client.config()),
			};
			let records = client.handle.qido.search(request, &client.headers).await?;
			Ok::<_, ClientError>(normalize_all(records, client.config(), secure_origin))
		})
		.await
	}

	/// Searches the series of a study on every source.
	#[instrument(skip_all, fields(study = study_instance_uid))]
	pub async fn search_series(&self, registry: &ClientRegistry, study_instance_uid: &str) -> FederatedResult {
		let secure_origin = self.secure_origin;
		self.search(registry.query_clients(), QueryLevel::Series, |client| async move {
			let request = SearchRequest {
				query: ResourceQuery::series_in_study(study_instance_uid),
				parameters: QueryParameters::default(),
			};
			let records = client.handle.qido.search(request, &client.headers).await?;
			Ok::<_, ClientError>(normalize_all(records, client.config(), secure_origin))
		})
		.await
	}

	/// Retrieves the metadata of a study from every source.
	///
	/// A series belongs to the first source (in registration order) that returned it. All of
	/// its instances are taken from that source and instances of the same series from later
	/// sources are dropped, so a series is never assembled from several sources.
	#[instrument(skip_all, fields(study = study_instance_uid))]
	pub async fn study_metadata(&self, registry: &ClientRegistry, study_instance_uid: &str) -> FederatedMetadata {
		let secure_origin = self.secure_origin;
		let outcomes = self
			.settle_all(registry.retrieval_clients(), |client| async move {
				let request = MetadataRequest::study(study_instance_uid);
				let instances = client.handle.wado.retrieve_metadata(request, &client.headers).await?;
				Ok::<_, ClientError>(normalize_all(instances, client.config(), secure_origin))
			})
			.await;

		let mut result = FederatedMetadata::default();
		let mut owned_series: HashSet<String> = HashSet::new();

		for (source, outcome) in outcomes {
			let instances = match outcome {
				Ok(instances) => instances,
				Err(err) => {
					result.failed_sources.push(SourceFailure::new(source, &err));
					continue;
				}
			};

			let mut new_series = HashSet::new();
			for dataset in instances {
				let series = dataset
					.string(tags::SERIES_INSTANCE_UID)
					.unwrap_or_default()
					.to_owned();
				if owned_series.contains(&series) {
					continue;
				}
				new_series.insert(series);
				result.instances.push(InstanceMetadata {
					source: source.clone(),
					dataset,
				});
			}
			owned_series.extend(new_series);
		}

		debug!(
			instances = result.instances.len(),
			series = owned_series.len(),
			failed = result.failed_sources.len(),
			"Merged federated study metadata"
		);
		result
	}

	/// Awaits `query_fn` for all clients. Never stops early: every client either returns,
	/// fails or runs into the timeout.
	async fn settle_all<F, Fut, T>(&self, clients: Vec<PreparedClient>, query_fn: F) -> Vec<ClientOutcome<T>>
	where
		F: Fn(PreparedClient) -> Fut,
		Fut: Future<Output = Result<T, ClientError>>,
	{
		let timeout = self.query_timeout;
		let queries = clients.into_iter().map(|client| {
			let source = client.name().to_owned();
			let query = query_fn(client);
			async move {
				let outcome = tokio::time::timeout(timeout, query)
					.await
					.unwrap_or_else(|_| Err(ClientError::Timeout(timeout)));
				if let Err(err) = &outcome {
					warn!(%source, "Source did not contribute: {err}");
				}
				(source, outcome)
			}
		});
		join_all(queries).await
	}
}

fn normalize_all(records: Vec<Dataset>, source: &SourceConfig, secure_origin: bool) -> Vec<Dataset> {
	let context = NormalizeContext::for_source(source, secure_origin);
	records
		.into_iter()
		.map(|mut record| {
			record.normalize(context);
			record
		})
		.collect()
}
