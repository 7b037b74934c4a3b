use super::{resolve_bulk_data_uri, upgrade_to_https, Dataset, DatasetError, Element, InstanceContext};
use super::BULK_DATA_URI_KEY;
use crate::config::SourceConfig;
use crate::types::is_tag_key;
use dicom::core::VR;
use serde_json::{Number, Value};

/// Value representations whose string values are converted to JSON numbers.
pub const NUMERIC_VRS: &[VR] = &[
	VR::DS,
	VR::FL,
	VR::FD,
	VR::IS,
	VR::OD,
	VR::OF,
	VR::OL,
	VR::OV,
	VR::SL,
	VR::SS,
	VR::SV,
	VR::UL,
	VR::US,
	VR::UV,
];

/// What the normalizer needs to know about where a dataset came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeContext<'a> {
	/// The source that served the dataset. Without one, bulk data URIs are hoisted but
	/// not resolved.
	pub source: Option<&'a SourceConfig>,
	/// Upgrade `http:` bulk data URIs to `https:`.
	pub secure_origin: bool,
}

impl<'a> NormalizeContext<'a> {
	pub const fn for_source(source: &'a SourceConfig, secure_origin: bool) -> Self {
		Self {
			source: Some(source),
			secure_origin,
		}
	}
}

pub fn is_numeric_vr(vr: VR) -> bool {
	NUMERIC_VRS.contains(&vr)
}

impl Dataset {
	/// Normalizes the dataset in place. Bulk data references and numbers in nested
	/// sequences are resolved against the study and series of this (top level) dataset.
	pub fn normalize(&mut self, context: NormalizeContext<'_>) {
		let instance = InstanceContext::from_dataset(self);
		normalize_dataset(self, &instance, context);
	}
}

/// Normalizes an owned dataset. See [`Dataset::normalize`].
pub fn normalize(mut dataset: Dataset, context: NormalizeContext<'_>) -> Dataset {
	dataset.normalize(context);
	dataset
}

/// Normalizes arbitrary JSON: arrays are walked element-wise, objects keyed by DICOM tags
/// are normalized as datasets and everything else is returned unchanged.
pub fn normalize_json(value: Value, context: NormalizeContext<'_>) -> Value {
	match value {
		Value::Array(items) => Value::Array(
			items
				.into_iter()
				.map(|item| normalize_json(item, context))
				.collect(),
		),
		Value::Object(ref map) if !map.is_empty() && map.keys().all(|k| is_tag_key(k)) => {
			match Dataset::from_json(value.clone()) {
				Ok(dataset) => normalize(dataset, context).to_json().unwrap_or(value),
				Err(_) => value,
			}
		}
		other => other,
	}
}

/// Normalizes a dataset without source context and deep copies it through its serialized
/// form, so the result owns plain data only and can be handed to another thread or process.
pub fn transfer_denaturalized_dataset(dataset: &Dataset) -> Result<Dataset, DatasetError> {
	let normalized = normalize(dataset.clone(), NormalizeContext::default());
	let bytes = serde_json::to_vec(&normalized)?;
	Ok(serde_json::from_slice(&bytes)?)
}

fn normalize_dataset(dataset: &mut Dataset, instance: &InstanceContext, context: NormalizeContext<'_>) {
	for (_, element) in dataset.iter_mut() {
		normalize_element(element, instance, context);
	}
}

fn normalize_element(element: &mut Element, instance: &InstanceContext, context: NormalizeContext<'_>) {
	match element {
		Element::Inline { vr, values } => {
			if let Some(mut uri) = wrapped_bulk_data_uri(values) {
				resolve_reference(&mut uri, instance, context);
				*element = Element::BulkData { vr: vr.take(), uri };
				return;
			}

			match vr.as_deref().and_then(|vr| vr.parse::<VR>().ok()) {
				Some(vr) if is_numeric_vr(vr) => {
					for value in values.iter_mut() {
						coerce_number(value);
					}
				}
				_ => {
					for value in values.iter_mut() {
						if value.is_object() {
							*value = normalize_json(value.take(), context);
						}
					}
				}
			}
		}
		Element::Sequence { items } => {
			for item in items {
				normalize_dataset(item, instance, context);
			}
		}
		Element::BulkData { uri, .. } => resolve_reference(uri, instance, context),
		Element::InlineBinary { .. } => {}
	}
}

fn resolve_reference(uri: &mut String, instance: &InstanceContext, context: NormalizeContext<'_>) {
	if let Some(source) = context.source {
		resolve_bulk_data_uri(uri, instance, source);
	}
	if context.secure_origin {
		upgrade_to_https(uri);
	}
}

/// Returns the URI of a `Value` array that only holds a `{"BulkDataURI": ...}` placeholder.
fn wrapped_bulk_data_uri(values: &[Value]) -> Option<String> {
	match values {
		[single] => single
			.get(BULK_DATA_URI_KEY)
			.and_then(Value::as_str)
			.map(str::to_owned),
		_ => None,
	}
}

fn coerce_number(value: &mut Value) {
	let Value::String(text) = value else {
		return;
	};
	let trimmed = text.trim();
	if trimmed.is_empty() {
		*value = Value::Null;
	} else if let Ok(int) = trimmed.parse::<i64>() {
		*value = Value::from(int);
	} else if let Ok(uint) = trimmed.parse::<u64>() {
		*value = Value::from(uint);
	} else if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
		*value = Value::Number(number);
	}
}
