mod repair;

pub use repair::*;

use bytes::Bytes;
use tracing::{debug, warn};

/// Uses the `multer` crate to split a `multipart/related` response body into its parts.
/// `multer` only deals with multipart/form-data out of the box, so the boundary is
/// extracted here.
pub struct DicomMultipart(multer::Multipart<'static>);

impl DicomMultipart {
	/// This implementation is based on [`multer::parse_boundary`],
	/// but with multipart/related instead of multipart/form-data.
	pub fn parse_boundary(content_type: &str) -> multer::Result<String> {
		let mime = content_type
			.parse::<mime::Mime>()
			.map_err(multer::Error::DecodeContentType)?;

		// The `multer` crate expects multipart/form-data here, but in DICOM multipart/related is used.
		if !(mime.type_() == mime::MULTIPART && mime.subtype().as_str() == "related") {
			return Err(multer::Error::NoMultipart);
		}

		mime.get_param(mime::BOUNDARY)
			.map(|name| name.as_str().to_owned())
			.ok_or(multer::Error::NoBoundary)
	}

	pub fn new(body: Bytes, boundary: impl Into<String>) -> Self {
		let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
		Self(multer::Multipart::new(stream, boundary.into()))
	}

	/// Reads every part into memory, in order.
	pub async fn collect_parts(mut self) -> multer::Result<Vec<Bytes>> {
		let mut parts = Vec::new();
		while let Some(field) = self.0.next_field().await? {
			parts.push(field.bytes().await?);
		}
		Ok(parts)
	}
}

/// Turns a retrieval response body into its parts.
///
/// Properly labeled `multipart/related` bodies are split with [`DicomMultipart`]. Anything
/// else is treated as a single part, which may still be multipart content hidden behind a
/// wrong content type and therefore goes through [`repair`].
pub async fn decode_parts(content_type: Option<&str>, body: Bytes) -> Vec<Bytes> {
	let Some(boundary) = content_type.and_then(|c| DicomMultipart::parse_boundary(c).ok()) else {
		return vec![repair(body)];
	};

	match DicomMultipart::new(body.clone(), boundary).collect_parts().await {
		Ok(parts) => {
			debug!(parts = parts.len(), "Decoded multipart/related response");
			parts
		}
		Err(err) => {
			warn!("Failed to decode multipart/related response, falling back to repair: {err}");
			vec![repair(body)]
		}
	}
}
