use dicom::core::Tag;
use std::fmt::{Display, Formatter};

/// UI (Unique Identifier) value representation.
pub type UI = String;

/// Formats a tag the way DICOM-JSON keys its attributes: eight uppercase hex digits.
pub fn tag_key(tag: Tag) -> String {
	format!("{:04X}{:04X}", tag.group(), tag.element())
}

/// Returns true if `key` looks like a DICOM-JSON attribute key (eight hex digits).
pub fn is_tag_key(key: &str) -> bool {
	key.len() == 8 && key.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The level a federated search operates on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryLevel {
	Study,
	Series,
}

impl QueryLevel {
	/// The attribute that identifies a record of this level across sources.
	pub const fn identity_tag(self) -> Tag {
		match self {
			Self::Study => dicom::dictionary_std::tags::STUDY_INSTANCE_UID,
			Self::Series => dicom::dictionary_std::tags::SERIES_INSTANCE_UID,
		}
	}
}

impl Display for QueryLevel {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Study => write!(f, "STUDY"),
			Self::Series => write!(f, "SERIES"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dicom::dictionary_std::tags;

	#[test]
	fn formats_tag_keys() {
		assert_eq!(tag_key(tags::STUDY_INSTANCE_UID), "0020000D");
		assert_eq!(tag_key(tags::PATIENT_NAME), "00100010");
		assert!(is_tag_key("0020000d"));
		assert!(!is_tag_key("mrn"));
	}

	#[test]
	fn identity_tags() {
		assert_eq!(tag_key(QueryLevel::Series.identity_tag()), "0020000E");
	}
}
