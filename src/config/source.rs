use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration of one remote DICOMweb server.
///
/// The field names follow Rust conventions, but the camelCase keys commonly used for
/// DICOMweb data source configurations (`qidoRoot`, `wadoRoot`, `staticWado`, ...) are
/// accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
	/// Unique name of the source. Used for lookups and to tag retrieved instances.
	pub name: String,
	/// Base URL for QIDO-RS requests.
	#[serde(alias = "qidoRoot")]
	pub query_root: Option<String>,
	/// Base URL for WADO-RS requests.
	#[serde(alias = "wadoRoot")]
	pub retrieval_root: Option<String>,
	/// Base URL of the legacy WADO-URI service.
	#[serde(alias = "wadoUriRoot")]
	pub retrieval_uri_root: Option<String>,
	/// The source serves a fixed snapshot and ignores query parameters.
	#[serde(alias = "staticWado")]
	pub is_static: bool,
	#[serde(alias = "singlepart")]
	pub use_single_part_responses: bool,
	/// What relative bulk data URIs are relative to. Defaults to the series.
	#[serde(alias = "relativeResolution")]
	pub bulk_data_relative_resolution: Option<RelativeResolution>,
	/// Substring replacements applied to bulk data URIs before they are resolved.
	pub bulk_data_uri_rewrites: Vec<UriRewrite>,
	#[serde(alias = "supportsFuzzyMatching")]
	pub supports_fuzzy_matching: bool,
	#[serde(alias = "supportsWildcard")]
	pub supports_wildcard: bool,
	/// Explicit `Accept` header values for retrievals. Overrides the computed header.
	#[serde(alias = "acceptHeader")]
	pub accept_header: Vec<String>,
	#[serde(alias = "requestTransferSyntaxUID")]
	pub request_transfer_syntax_uid: Option<String>,
	#[serde(alias = "omitQuotationForMultipartRequest")]
	pub omit_quotation_for_multipart_request: bool,
	#[serde(alias = "imageRendering")]
	pub image_rendering: ImageRendering,
	/// Free-form options that are not interpreted by the federation layer.
	pub options: HashMap<String, String>,
}

impl SourceConfig {
	pub fn new(
		name: impl Into<String>,
		query_root: impl Into<String>,
		retrieval_root: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			query_root: Some(query_root.into()),
			retrieval_root: Some(retrieval_root.into()),
			..Self::default()
		}
	}

	/// A source is usable only if both the query and the retrieval root are set.
	pub fn is_complete(&self) -> bool {
		let present = |root: &Option<String>| root.as_deref().is_some_and(|r| !r.is_empty());
		present(&self.query_root) && present(&self.retrieval_root)
	}

	pub fn query_root(&self) -> &str {
		trim_root(self.query_root.as_deref())
	}

	pub fn retrieval_root(&self) -> &str {
		trim_root(self.retrieval_root.as_deref())
	}

	pub fn retrieval_uri_root(&self) -> &str {
		trim_root(self.retrieval_uri_root.as_deref())
	}

	pub fn relative_resolution(&self) -> RelativeResolution {
		self.bulk_data_relative_resolution.unwrap_or_default()
	}
}

fn trim_root(root: Option<&str>) -> &str {
	root.unwrap_or_default().trim_end_matches('/')
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeResolution {
	#[default]
	Series,
	#[serde(alias = "study")]
	Studies,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRendering {
	#[default]
	WadoRs,
	WadoUri,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriRewrite {
	pub from: String,
	pub to: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deserialize_camel_case_keys() {
		let json = serde_json::json!({
			"name": "aws",
			"qidoRoot": "https://example.org/dicomweb/",
			"wadoRoot": "https://example.org/dicomweb",
			"staticWado": true,
			"singlepart": true,
			"relativeResolution": "studies",
			"supportsWildcard": true
		});
		let config: SourceConfig = serde_json::from_value(json).unwrap();

		assert!(config.is_static);
		assert!(config.use_single_part_responses);
		assert!(config.supports_wildcard);
		assert_eq!(config.relative_resolution(), RelativeResolution::Studies);
		assert_eq!(config.query_root(), "https://example.org/dicomweb");
		assert!(config.is_complete());
	}

	#[test]
	fn incomplete_without_roots() {
		let mut config = SourceConfig::new("a", "http://h/qido", "");
		assert!(!config.is_complete());
		config.retrieval_root = None;
		assert!(!config.is_complete());
		assert_eq!(config.relative_resolution(), RelativeResolution::Series);
	}
}
