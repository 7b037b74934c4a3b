mod filter;
mod params;
mod results;
mod service;

pub use filter::*;
pub use params::*;
pub use results::*;
pub use service::*;

use crate::types::{is_tag_key, tag_key, QueryLevel};
use dicom::core::Tag;
use dicom::dictionary_std::tags;

/// Maps query field names to the attributes they filter on.
///
/// Field names are compared case-insensitively. The attribute keys themselves
/// (e.g. `0020000D`) are accepted as field names as long as they belong to the table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldAliases(&'static [(&'static str, Tag)]);

/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.6.3.3.html#table_10.6.3-3>
pub const STUDY_FIELDS: FieldAliases = FieldAliases(&[
	("studyinstanceuid", tags::STUDY_INSTANCE_UID),
	("patientname", tags::PATIENT_NAME),
	("patientid", tags::PATIENT_ID),
	("mrn", tags::PATIENT_ID),
	("studydescription", tags::STUDY_DESCRIPTION),
	("studydate", tags::STUDY_DATE),
	("modalitiesinstudy", tags::MODALITIES_IN_STUDY),
	("accessionnumber", tags::ACCESSION_NUMBER),
]);

/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.6.3.3.2.html>
pub const SERIES_FIELDS: FieldAliases = FieldAliases(&[
	("seriesinstanceuid", tags::SERIES_INSTANCE_UID),
	("seriesnumber", tags::SERIES_NUMBER),
	("modality", tags::MODALITY),
]);

impl FieldAliases {
	pub const fn for_level(level: QueryLevel) -> Self {
		match level {
			QueryLevel::Study => STUDY_FIELDS,
			QueryLevel::Series => SERIES_FIELDS,
		}
	}

	/// Resolves a query field name to the DICOM-JSON key of the attribute it filters on.
	/// Returns [`None`] for fields that are not part of this table, such as `limit`.
	pub fn resolve(&self, field: &str) -> Option<String> {
		let lower = field.to_ascii_lowercase();
		if let Some((_, tag)) = self.0.iter().find(|(name, _)| *name == lower) {
			return Some(tag_key(*tag));
		}

		if is_tag_key(field) {
			let key = field.to_ascii_uppercase();
			return self
				.0
				.iter()
				.any(|(_, tag)| tag_key(*tag) == key)
				.then_some(key);
		}

		None
	}
}

/// A single match value of a [`QuerySpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
	/// An exact value, a wildcard pattern or a `start-end` date range.
	Single(String),
	/// Matches if any of the values matches.
	Any(Vec<String>),
}

impl QueryValue {
	/// Parses a wire value. Comma separated values turn into [`QueryValue::Any`].
	pub fn parse(value: &str) -> Self {
		if value.contains(',') {
			Self::Any(value.split(',').map(str::to_owned).collect())
		} else {
			Self::Single(value.to_owned())
		}
	}

	/// The wire representation: multiple values are joined with commas.
	pub fn to_query_value(&self) -> String {
		match self {
			Self::Single(value) => value.clone(),
			Self::Any(values) => values.join(","),
		}
	}
}

impl From<&str> for QueryValue {
	fn from(value: &str) -> Self {
		Self::Single(value.to_owned())
	}
}

impl From<String> for QueryValue {
	fn from(value: String) -> Self {
		Self::Single(value)
	}
}

impl From<Vec<String>> for QueryValue {
	fn from(values: Vec<String>) -> Self {
		Self::Any(values)
	}
}

/// The match criteria of a logical query, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec(Vec<(String, QueryValue)>);

impl QuerySpec {
	pub const fn new() -> Self {
		Self(Vec::new())
	}

	#[must_use]
	pub fn with(mut self, field: impl Into<String>, value: impl Into<QueryValue>) -> Self {
		self.push(field, value);
		self
	}

	pub fn push(&mut self, field: impl Into<String>, value: impl Into<QueryValue>) {
		self.0.push((field.into(), value.into()));
	}

	/// Returns the value of a field. Field names are compared case-insensitively.
	pub fn get(&self, field: &str) -> Option<&QueryValue> {
		self.0
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(field))
			.map(|(_, value)| value)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
		self.0.iter().map(|(field, value)| (field.as_str(), value))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn into_inner(self) -> Vec<(String, QueryValue)> {
		self.0
	}
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for QuerySpec {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(field, value)| (field.into(), QueryValue::parse(value.as_ref())))
				.collect(),
		)
	}
}
