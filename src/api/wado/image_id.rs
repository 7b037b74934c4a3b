use super::InstanceUids;
use crate::config::{ImageRendering, SourceConfig};
use url::form_urlencoded;

const WADO_RS_SCHEME: &str = "wadors:";
const WADO_URI_SCHEME: &str = "wadouri:";

/// Builds the image id a viewer uses to load one frame of an instance from `source`.
///
/// WADO-RS ids address a frame resource directly; frames default to the first one.
/// WADO-URI ids use the legacy `requestType=WADO` query and only carry a frame number
/// when one is given. Without a WADO-URI root the retrieval root is used.
pub fn image_id(source: &SourceConfig, instance: &InstanceUids, frame: Option<u32>) -> String {
	match source.image_rendering {
		ImageRendering::WadoRs => format!(
			"{WADO_RS_SCHEME}{}/studies/{}/series/{}/instances/{}/frames/{}",
			source.retrieval_root(),
			instance.study_instance_uid,
			instance.series_instance_uid,
			instance.sop_instance_uid,
			frame.unwrap_or(1)
		),
		ImageRendering::WadoUri => {
			let mut query = form_urlencoded::Serializer::new(String::new());
			query
				.append_pair("requestType", "WADO")
				.append_pair("studyUID", &instance.study_instance_uid)
				.append_pair("seriesUID", &instance.series_instance_uid)
				.append_pair("objectUID", &instance.sop_instance_uid)
				.append_pair("contentType", "application/dicom");
			if let Some(frame) = frame {
				query.append_pair("frame", &frame.to_string());
			}
			let root = match source.retrieval_uri_root() {
				"" => source.retrieval_root(),
				root => root,
			};
			format!("{WADO_URI_SCHEME}{root}?{}", query.finish())
		}
	}
}
