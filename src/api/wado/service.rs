use crate::backend::ClientError;
use crate::dataset::{Dataset, InstanceContext};
use crate::types::UI;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

/// Provides the retrieve transactions of one source.
///
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html>
#[async_trait]
pub trait WadoService: Send + Sync {
	/// Retrieves the metadata of all instances of a study, or of one of its series.
	async fn retrieve_metadata(
		&self,
		request: MetadataRequest,
		headers: &HeaderMap,
	) -> Result<Vec<Dataset>, ClientError>;

	/// Retrieves frames of an instance, one buffer per frame in response order.
	async fn retrieve_frames(&self, request: FramesRequest, headers: &HeaderMap) -> Result<Vec<Bytes>, ClientError>;

	/// Retrieves the bulk data behind a `BulkDataURI`.
	async fn retrieve_bulk_data(&self, request: BulkDataRequest, headers: &HeaderMap) -> Result<Bytes, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
	pub study_instance_uid: UI,
	pub series_instance_uid: Option<UI>,
}

impl MetadataRequest {
	pub fn study(study_instance_uid: impl Into<UI>) -> Self {
		Self {
			study_instance_uid: study_instance_uid.into(),
			series_instance_uid: None,
		}
	}

	/// The resource path relative to the retrieval root.
	pub fn path(&self) -> String {
		match &self.series_instance_uid {
			Some(series) => format!("studies/{}/series/{series}/metadata", self.study_instance_uid),
			None => format!("studies/{}/metadata", self.study_instance_uid),
		}
	}
}

/// Identifies a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceUids {
	pub study_instance_uid: UI,
	pub series_instance_uid: UI,
	pub sop_instance_uid: UI,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramesRequest {
	pub instance: InstanceUids,
	/// One-based frame numbers.
	pub frames: Vec<u32>,
}

impl FramesRequest {
	pub fn path(&self) -> String {
		let frames = self
			.frames
			.iter()
			.map(u32::to_string)
			.collect::<Vec<_>>()
			.join(",");
		format!(
			"studies/{}/series/{}/instances/{}/frames/{frames}",
			self.instance.study_instance_uid, self.instance.series_instance_uid, self.instance.sop_instance_uid
		)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDataRequest {
	/// The `BulkDataURI` as found in the metadata. Relative forms are resolved against the
	/// source using `instance`.
	pub uri: String,
	pub instance: InstanceContext,
	/// Preferred media type of the bulk data, e.g. `application/pdf`.
	pub media_type: Option<String>,
}
