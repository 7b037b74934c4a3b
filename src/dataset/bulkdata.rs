use super::Dataset;
use crate::config::{RelativeResolution, SourceConfig};
use dicom::dictionary_std::tags;
use tracing::trace;
use url::Url;

/// The study and series a bulk data reference belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceContext {
	pub study_instance_uid: Option<String>,
	pub series_instance_uid: Option<String>,
}

impl InstanceContext {
	pub fn new(study: impl Into<String>, series: Option<String>) -> Self {
		Self {
			study_instance_uid: Some(study.into()),
			series_instance_uid: series,
		}
	}

	pub fn from_dataset(dataset: &Dataset) -> Self {
		Self {
			study_instance_uid: dataset.string(tags::STUDY_INSTANCE_UID).map(str::to_owned),
			series_instance_uid: dataset.string(tags::SERIES_INSTANCE_UID).map(str::to_owned),
		}
	}
}

/// Resolves `uri` in place to an absolute URI served by `source`.
///
/// - URIs starting with `http` are left as they are.
/// - Server-relative URIs (`/...`) are prefixed with the origin of the retrieval root, if
///   the root is absolute. A relative root means the URI is already usable.
/// - Anything else is relative to the series or the study, depending on
///   [`SourceConfig::bulk_data_relative_resolution`]. Series-relative URIs fall back to the
///   study if the series is unknown.
pub fn resolve_bulk_data_uri(uri: &mut String, instance: &InstanceContext, source: &SourceConfig) {
	for rewrite in &source.bulk_data_uri_rewrites {
		if uri.contains(&rewrite.from) {
			*uri = uri.replace(&rewrite.from, &rewrite.to);
		}
	}

	let root = source.retrieval_root();

	if !uri.starts_with("http") && !uri.starts_with('/') {
		let Some(study) = instance.study_instance_uid.as_deref() else {
			trace!(uri = %uri, "Cannot resolve relative bulk data URI without a study");
			return;
		};
		let relative = uri.trim_start_matches("./");
		*uri = match (source.relative_resolution(), instance.series_instance_uid.as_deref()) {
			(RelativeResolution::Series, Some(series)) => {
				format!("{root}/studies/{study}/series/{series}/{relative}")
			}
			_ => format!("{root}/studies/{study}/{relative}"),
		};
	}

	if uri.starts_with('/') && root.starts_with("http") {
		if let Some(origin) = origin_of(root) {
			uri.insert_str(0, &origin);
		}
	}
}

/// Replaces an `http:` scheme with `https:`.
pub fn upgrade_to_https(uri: &mut String) {
	if uri.starts_with("http:") {
		uri.replace_range(..4, "https");
	}
}

fn origin_of(root: &str) -> Option<String> {
	let url = Url::parse(root).ok()?;
	let origin = url.origin();
	origin.is_tuple().then(|| origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::UriRewrite;

	fn source(root: &str, resolution: Option<RelativeResolution>) -> SourceConfig {
		SourceConfig {
			bulk_data_relative_resolution: resolution,
			..SourceConfig::new("test", root, root)
		}
	}

	fn resolve(uri: &str, instance: &InstanceContext, source: &SourceConfig) -> String {
		let mut uri = uri.to_owned();
		resolve_bulk_data_uri(&mut uri, instance, source);
		uri
	}

	#[test]
	fn study_relative() {
		let source = source("http://h/dicomweb", Some(RelativeResolution::Studies));
		let instance = InstanceContext::new("S", Some(String::from("SE")));
		assert_eq!(resolve("bulk/1", &instance, &source), "http://h/dicomweb/studies/S/bulk/1");
	}

	#[test]
	fn series_relative_by_default() {
		let source = source("http://h/dicomweb/", None);
		let instance = InstanceContext::new("S", Some(String::from("SE")));
		assert_eq!(
			resolve("bulk/1", &instance, &source),
			"http://h/dicomweb/studies/S/series/SE/bulk/1"
		);
	}

	#[test]
	fn series_relative_without_series_uses_study() {
		let source = source("http://h/dicomweb", None);
		let instance = InstanceContext::new("S", None);
		assert_eq!(resolve("bulk/1", &instance, &source), "http://h/dicomweb/studies/S/bulk/1");
	}

	#[test]
	fn server_relative_gets_origin() {
		let source = source("https://h:8443/pacs/dicomweb", None);
		let instance = InstanceContext::default();
		assert_eq!(
			resolve("/pacs/dicomweb/bulk/1", &instance, &source),
			"https://h:8443/pacs/dicomweb/bulk/1"
		);
	}

	#[test]
	fn server_relative_with_relative_root_is_kept() {
		let source = source("/dicomweb", None);
		let instance = InstanceContext::new("S", None);
		assert_eq!(resolve("/dicomweb/bulk/1", &instance, &source), "/dicomweb/bulk/1");
		assert_eq!(resolve("bulk/1", &instance, &source), "/dicomweb/studies/S/bulk/1");
	}

	#[test]
	fn absolute_is_kept() {
		let source = source("http://h/dicomweb", None);
		let instance = InstanceContext::new("S", None);
		assert_eq!(resolve("http://other/bulk/1", &instance, &source), "http://other/bulk/1");
	}

	#[test]
	fn relative_without_study_is_kept() {
		let source = source("http://h/dicomweb", None);
		assert_eq!(resolve("bulk/1", &InstanceContext::default(), &source), "bulk/1");
	}

	#[test]
	fn rewrites_apply_first() {
		let mut source = source("http://h/dicomweb", None);
		source.bulk_data_uri_rewrites.push(UriRewrite {
			from: String::from("/pixeldata.mp4"),
			to: String::from("/rendered"),
		});
		let instance = InstanceContext::default();
		assert_eq!(
			resolve("http://h/dicomweb/pixeldata.mp4", &instance, &source),
			"http://h/dicomweb/rendered"
		);
	}

	#[test]
	fn upgrade_scheme() {
		let mut uri = String::from("http://h/bulk");
		upgrade_to_https(&mut uri);
		assert_eq!(uri, "https://h/bulk");
		upgrade_to_https(&mut uri);
		assert_eq!(uri, "https://h/bulk");
	}
}
