//! Typed view of DICOM-JSON datasets (PS3.18 Annex F).
//!
//! Attributes are kept as an [`Element`] variant instead of free-form JSON so that
//! normalization is an explicit transformation over the possible shapes.

mod bulkdata;
mod normalize;

pub use bulkdata::*;
pub use normalize::*;

use crate::types::tag_key;
use dicom::core::{Tag, VR};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

const VR_KEY: &str = "vr";
const VALUE_KEY: &str = "Value";
const BULK_DATA_URI_KEY: &str = "BulkDataURI";
const INLINE_BINARY_KEY: &str = "InlineBinary";

#[derive(Debug, Error)]
pub enum DatasetError {
	#[error("invalid DICOM-JSON: {0}")]
	Json(#[from] serde_json::Error),
}

/// A DICOM-JSON object: attribute key (eight uppercase hex digits) to element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(BTreeMap<String, Element>);

impl Dataset {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_json(value: Value) -> Result<Self, DatasetError> {
		Ok(serde_json::from_value(value)?)
	}

	pub fn to_json(&self) -> Result<Value, DatasetError> {
		Ok(serde_json::to_value(self)?)
	}

	pub fn get(&self, tag: Tag) -> Option<&Element> {
		self.0.get(&tag_key(tag))
	}

	pub fn get_mut(&mut self, tag: Tag) -> Option<&mut Element> {
		self.0.get_mut(&tag_key(tag))
	}

	/// Looks up an attribute by its DICOM-JSON key. Keys are compared case-insensitively.
	pub fn get_key(&self, key: &str) -> Option<&Element> {
		self.0
			.get(key)
			.or_else(|| self.0.get(&key.to_ascii_uppercase()))
	}

	pub fn insert(&mut self, tag: Tag, element: Element) -> Option<Element> {
		self.0.insert(tag_key(tag), element)
	}

	pub fn remove(&mut self, tag: Tag) -> Option<Element> {
		self.0.remove(&tag_key(tag))
	}

	/// The first value of the attribute as a string, if it has one.
	pub fn string(&self, tag: Tag) -> Option<&str> {
		self.get(tag)?.first_value()?.as_str()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Element)> {
		self.0.iter()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Element)> {
		self.0.iter_mut()
	}
}

impl FromIterator<(Tag, Element)> for Dataset {
	fn from_iter<T: IntoIterator<Item = (Tag, Element)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(tag, element)| (tag_key(tag), element))
				.collect(),
		)
	}
}

/// One attribute of a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
	/// Primitive values: strings, numbers or person name objects. An empty list is
	/// serialized without a `Value` key.
	Inline { vr: Option<String>, values: Vec<Value> },
	/// A sequence of nested datasets.
	Sequence { items: Vec<Dataset> },
	/// A reference to bulk data that must be fetched separately.
	BulkData { vr: Option<String>, uri: String },
	/// Base64 encoded binary value.
	InlineBinary { vr: Option<String>, data: String },
}

impl Element {
	pub fn inline(vr: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
		Self::Inline {
			vr: Some(vr.to_owned()),
			values: values.into_iter().map(Into::into).collect(),
		}
	}

	pub fn vr(&self) -> Option<&str> {
		match self {
			Self::Inline { vr, .. } | Self::BulkData { vr, .. } | Self::InlineBinary { vr, .. } => {
				vr.as_deref()
			}
			Self::Sequence { .. } => Some("SQ"),
		}
	}

	/// The parsed value representation, if the element declares a known one.
	pub fn value_representation(&self) -> Option<VR> {
		self.vr().and_then(|vr| VR::from_str(vr).ok())
	}

	pub fn values(&self) -> &[Value] {
		match self {
			Self::Inline { values, .. } => values,
			_ => &[],
		}
	}

	pub fn first_value(&self) -> Option<&Value> {
		self.values().first()
	}

	pub fn bulk_data_uri(&self) -> Option<&str> {
		match self {
			Self::BulkData { uri, .. } => Some(uri),
			_ => None,
		}
	}
}

#[derive(Deserialize)]
struct RawElement {
	vr: Option<String>,
	#[serde(rename = "Value")]
	value: Option<Vec<Value>>,
	#[serde(rename = "BulkDataURI")]
	bulk_data_uri: Option<String>,
	#[serde(rename = "InlineBinary")]
	inline_binary: Option<String>,
}

impl<'de> Deserialize<'de> for Element {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = RawElement::deserialize(deserializer)?;

		if let Some(uri) = raw.bulk_data_uri {
			return Ok(Self::BulkData { vr: raw.vr, uri });
		}
		if let Some(data) = raw.inline_binary {
			return Ok(Self::InlineBinary { vr: raw.vr, data });
		}

		// A null `Value` is the DICOM-JSON representation of an empty attribute.
		let values = raw.value.unwrap_or_default();
		if raw.vr.as_deref() == Some("SQ") {
			let items = values
				.into_iter()
				.map(|item| serde_json::from_value(item).map_err(D::Error::custom))
				.collect::<Result<Vec<Dataset>, _>>()?;
			return Ok(Self::Sequence { items });
		}

		Ok(Self::Inline { vr: raw.vr, values })
	}
}

impl Serialize for Element {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(None)?;
		if let Some(vr) = self.vr() {
			map.serialize_entry(VR_KEY, vr)?;
		}
		match self {
			Self::Inline { values, .. } => {
				if !values.is_empty() {
					map.serialize_entry(VALUE_KEY, values)?;
				}
			}
			Self::Sequence { items } => {
				if !items.is_empty() {
					map.serialize_entry(VALUE_KEY, items)?;
				}
			}
			Self::BulkData { uri, .. } => map.serialize_entry(BULK_DATA_URI_KEY, uri)?,
			Self::InlineBinary { data, .. } => map.serialize_entry(INLINE_BINARY_KEY, data)?,
		}
		map.end()
	}
}
