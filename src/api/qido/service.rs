use super::QuerySpec;
use crate::backend::ClientError;
use crate::dataset::Dataset;
use crate::types::{tag_key, QueryLevel, UI};
use async_trait::async_trait;
use dicom::core::Tag;
use reqwest::header::HeaderMap;

/// Provides the functionality of a search transaction against one source.
///
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.6.html>
#[async_trait]
pub trait QidoService: Send + Sync {
	/// Runs the search with the given request headers. An empty result is not an error.
	async fn search(&self, request: SearchRequest, headers: &HeaderMap) -> Result<Vec<Dataset>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
	pub query: ResourceQuery,
	pub parameters: QueryParameters,
}

/// Query parameters for a QIDO-RS request.
///
/// <https://dicom.nema.org/medical/dicom/current/output/html/part18.html#table_8.3.4-1>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
	pub match_criteria: QuerySpec,
	pub fuzzy_matching: bool,
	pub include_field: Vec<Tag>,
	/// [`None`] leaves the page size to the server.
	pub limit: Option<usize>,
	pub offset: usize,
}

impl QueryParameters {
	/// The parameters as URL query pairs, in a stable order.
	pub fn to_query_pairs(&self) -> Vec<(String, String)> {
		let mut pairs: Vec<(String, String)> = self
			.match_criteria
			.iter()
			.map(|(field, value)| (field.to_owned(), value.to_query_value()))
			.collect();

		if self.fuzzy_matching {
			pairs.push((String::from("fuzzymatching"), String::from("true")));
		}
		if !self.include_field.is_empty() {
			let fields = self
				.include_field
				.iter()
				.map(|tag| tag_key(*tag))
				.collect::<Vec<_>>()
				.join(",");
			pairs.push((String::from("includefield"), fields));
		}
		if let Some(limit) = self.limit {
			pairs.push((String::from("limit"), limit.to_string()));
		}
		if self.offset > 0 {
			pairs.push((String::from("offset"), self.offset.to_string()));
		}
		pairs
	}
}

/// Data used to identify a specific search transaction resource.
///
/// As an example, the "Study's Series" resource searches for all series in a specified study:
/// ```
/// use dicomweb_federation::api::qido::ResourceQuery;
///
/// let studys_series = ResourceQuery::series_in_study("1.2.3");
/// assert_eq!(studys_series.path(), "studies/1.2.3/series");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
	pub level: QueryLevel,
	/// Scopes a series search to one study.
	pub study_instance_uid: Option<UI>,
}

impl ResourceQuery {
	pub const fn studies() -> Self {
		Self {
			level: QueryLevel::Study,
			study_instance_uid: None,
		}
	}

	pub fn series_in_study(study_instance_uid: impl Into<UI>) -> Self {
		Self {
			level: QueryLevel::Series,
			study_instance_uid: Some(study_instance_uid.into()),
		}
	}

	/// The resource path relative to the query root.
	pub fn path(&self) -> String {
		match (self.level, &self.study_instance_uid) {
			(QueryLevel::Study, _) => String::from("studies"),
			(QueryLevel::Series, Some(study)) => format!("studies/{study}/series"),
			(QueryLevel::Series, None) => String::from("series"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dicom::dictionary_std::tags;

	#[test]
	fn query_pairs() {
		let parameters = QueryParameters {
			match_criteria: QuerySpec::new()
				.with("PatientName", "*doe*")
				.with("StudyInstanceUID", vec![String::from("1"), String::from("2")]),
			fuzzy_matching: true,
			include_field: vec![tags::STUDY_DESCRIPTION, tags::MODALITY],
			limit: Some(101),
			offset: 0,
		};

		let pairs = parameters.to_query_pairs();
		let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
		assert_eq!(
			pairs,
			vec![
				("PatientName", "*doe*"),
				("StudyInstanceUID", "1,2"),
				("fuzzymatching", "true"),
				("includefield", "00081030,00080060"),
				("limit", "101"),
			]
		);
	}

	#[test]
	fn empty_parameters_have_no_pairs() {
		assert!(QueryParameters::default().to_query_pairs().is_empty());
	}

	#[test]
	fn resource_paths() {
		assert_eq!(ResourceQuery::studies().path(), "studies");
		assert_eq!(ResourceQuery::series_in_study("1.2").path(), "studies/1.2/series");
		let all_series = ResourceQuery {
			level: QueryLevel::Series,
			study_instance_uid: None,
		};
		assert_eq!(all_series.path(), "series");
	}
}
