use crate::dataset::{Dataset, Element};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use serde::Serialize;
use serde_json::Value;

/// A flattened study search result, as shown in a study list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySummary {
	pub study_instance_uid: String,
	pub date: String,
	pub time: String,
	pub accession: String,
	pub mrn: String,
	pub patient_name: String,
	pub instances: Option<u64>,
	pub description: String,
	pub modalities: String,
}

impl StudySummary {
	pub fn from_record(record: &Dataset) -> Self {
		Self {
			study_instance_uid: text(record, tags::STUDY_INSTANCE_UID),
			date: text(record, tags::STUDY_DATE),
			time: text(record, tags::STUDY_TIME),
			accession: text(record, tags::ACCESSION_NUMBER),
			mrn: text(record, tags::PATIENT_ID),
			patient_name: format_person_name(&text(record, tags::PATIENT_NAME)),
			instances: count(record, tags::NUMBER_OF_STUDY_RELATED_INSTANCES),
			description: text(record, tags::STUDY_DESCRIPTION),
			modalities: modalities(record),
		}
	}
}

/// A flattened series search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
	pub study_instance_uid: String,
	pub series_instance_uid: String,
	pub series_number: String,
	pub modality: String,
	pub series_date: String,
	pub instances: Option<u64>,
	pub description: String,
}

impl SeriesSummary {
	pub fn from_record(record: &Dataset) -> Self {
		Self {
			study_instance_uid: text(record, tags::STUDY_INSTANCE_UID),
			series_instance_uid: text(record, tags::SERIES_INSTANCE_UID),
			series_number: text(record, tags::SERIES_NUMBER),
			modality: text(record, tags::MODALITY),
			series_date: text(record, tags::SERIES_DATE),
			instances: count(record, tags::NUMBER_OF_SERIES_RELATED_INSTANCES),
			description: text(record, tags::SERIES_DESCRIPTION),
		}
	}
}

/// Turns `Family^Given^Middle` into `Family, Given, Middle`, skipping empty components.
pub fn format_person_name(name: &str) -> String {
	name.split('^')
		.map(str::trim)
		.filter(|component| !component.is_empty())
		.collect::<Vec<_>>()
		.join(", ")
}

/// All values of an attribute joined with a backslash. Person names contribute their
/// `Alphabetic` component.
fn text(record: &Dataset, tag: Tag) -> String {
	record
		.get(tag)
		.map(|element| joined(element.values()))
		.unwrap_or_default()
}

fn joined(values: &[Value]) -> String {
	values
		.iter()
		.filter_map(value_text)
		.collect::<Vec<_>>()
		.join("\\")
}

fn value_text(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		Value::Object(name) => name.get("Alphabetic").and_then(Value::as_str).map(str::to_owned),
		_ => None,
	}
}

fn count(record: &Dataset, tag: Tag) -> Option<u64> {
	match record.get(tag)?.first_value()? {
		Value::Number(number) => number.as_u64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

/// The union of `Modality` and `ModalitiesInStudy`, in that order.
fn modalities(record: &Dataset) -> String {
	let mut modalities: Vec<&Value> = Vec::new();
	for tag in [tags::MODALITY, tags::MODALITIES_IN_STUDY] {
		for value in record.get(tag).map(Element::values).unwrap_or_default() {
			if !modalities.contains(&value) {
				modalities.push(value);
			}
		}
	}
	modalities
		.into_iter()
		.filter_map(value_text)
		.collect::<Vec<_>>()
		.join("\\")
}
