//! Recovery of multipart/related bodies that arrive labeled as plain binary.
//!
//! Some servers answer bulk data and frame requests with a multipart/related body but
//! declare `application/octet-stream`. The heuristics below detect that case by looking
//! at the raw bytes only and return the first body part.

use bytes::Bytes;

/// Bodies shorter than this cannot hold a boundary, part headers and a payload.
pub const MIN_MULTIPART_LEN: usize = 25;
/// The opening boundary must start within this many bytes of the buffer head.
pub const BOUNDARY_SEARCH_WINDOW: usize = 6;
/// Part headers ending beyond this offset are not considered a MIME header block.
pub const MAX_HEADER_LEN: usize = 512;

const BOUNDARY_PREFIX: &[u8] = b"--";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Tunable limits for the multipart detection heuristics.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RepairLimits {
	pub min_len: usize,
	pub boundary_window: usize,
	pub max_header_len: usize,
}

impl Default for RepairLimits {
	fn default() -> Self {
		Self {
			min_len: MIN_MULTIPART_LEN,
			boundary_window: BOUNDARY_SEARCH_WINDOW,
			max_header_len: MAX_HEADER_LEN,
		}
	}
}

/// The first part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstPart {
	/// The boundary line, including the leading `--`.
	pub boundary: String,
	/// The part's `Content-Type` header, if present.
	pub content_type: Option<String>,
	pub body: Bytes,
}

/// Returns the first body part if `buffer` is multipart content, otherwise `buffer` itself.
pub fn repair(buffer: Bytes) -> Bytes {
	repair_with(buffer, RepairLimits::default())
}

pub fn repair_with(buffer: Bytes, limits: RepairLimits) -> Bytes {
	match extract_first_part(&buffer, limits) {
		Some(part) => part.body,
		None => buffer,
	}
}

/// Extracts the first body part of `buffer`, or [`None`] if it does not look like multipart
/// content or the closing boundary is missing.
pub fn extract_first_part(buffer: &Bytes, limits: RepairLimits) -> Option<FirstPart> {
	if buffer.len() < limits.min_len {
		return None;
	}

	let window = &buffer[..limits.boundary_window.min(buffer.len())];
	let boundary_start = find(window, BOUNDARY_PREFIX, 0)?;

	let header_end = find(buffer, HEADER_END, boundary_start)?;
	if header_end > limits.max_header_len {
		return None;
	}

	// Latin-1 maps every byte to the code point of the same value.
	let header: String = buffer[..header_end].iter().map(|&b| char::from(b)).collect();
	let mut lines = header.split("\r\n");
	let boundary = lines.clone().find(|line| line.starts_with("--"))?.to_owned();
	let content_type = lines.find_map(|line| {
		let (name, value) = line.split_once(':')?;
		name.trim()
			.eq_ignore_ascii_case("content-type")
			.then(|| value.trim().to_owned())
	});

	let payload_start = header_end + HEADER_END.len();
	let boundary_bytes: Vec<u8> = boundary.chars().map(|c| c as u8).collect();
	let marker = find(buffer, &boundary_bytes, payload_start)?;
	// Exclude the CRLF that precedes the closing boundary.
	let payload_end = marker.saturating_sub(2).max(payload_start);

	Some(FirstPart {
		boundary,
		content_type,
		body: buffer.slice(payload_start..payload_end),
	})
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
	if needle.is_empty() || from >= haystack.len() {
		return None;
	}
	haystack[from..]
		.windows(needle.len())
		.position(|window| window == needle)
		.map(|index| index + from)
}
