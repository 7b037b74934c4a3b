use super::{FederatedResult, SourceFailure};
use crate::backend::ClientError;
use crate::dataset::{Dataset, Element};
use crate::types::QueryLevel;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// The outcome of one client's query, in registration order.
pub type ClientOutcome<T> = (String, Result<T, ClientError>);

/// Counts that are summed when a study is reported by more than one source.
const AGGREGATED_COUNTS: [Tag; 2] = [
	tags::NUMBER_OF_STUDY_RELATED_SERIES,
	tags::NUMBER_OF_STUDY_RELATED_INSTANCES,
];

/// Merges per-client results into one list.
///
/// A single participant is passed through as is. Otherwise records are appended in
/// registration order and a record whose identity was already seen is dropped, so the
/// earliest registered source wins. Records without identity are always kept.
pub fn merge(outcomes: Vec<ClientOutcome<Vec<Dataset>>>, level: QueryLevel, aggregate_counts: bool) -> FederatedResult {
	let mut result = FederatedResult::default();

	if outcomes.len() == 1 {
		for (source, outcome) in outcomes {
			match outcome {
				Ok(records) => result.records = records,
				Err(err) => result.failed_sources.push(SourceFailure::new(source, &err)),
			}
		}
		return result;
	}

	let identity = level.identity_tag();
	let mut seen: HashMap<String, usize> = HashMap::new();

	for (source, outcome) in outcomes {
		let records = match outcome {
			Ok(records) => records,
			Err(err) => {
				result.failed_sources.push(SourceFailure::new(source, &err));
				continue;
			}
		};

		for record in records {
			let Some(id) = record.string(identity).map(str::to_owned) else {
				result.records.push(record);
				continue;
			};

			if let Some(&index) = seen.get(&id) {
				trace!(%source, %id, "Dropping duplicate record");
				if aggregate_counts && level == QueryLevel::Study {
					add_counts(&mut result.records[index], &record);
				}
			} else {
				seen.insert(id, result.records.len());
				result.records.push(record);
			}
		}
	}

	result
}

/// Adds the related series and instance counts of `duplicate` onto `record`. Counts that
/// either side lacks are left alone.
fn add_counts(record: &mut Dataset, duplicate: &Dataset) {
	for tag in AGGREGATED_COUNTS {
		let Some(extra) = duplicate.get(tag).and_then(count) else {
			continue;
		};
		let Some(element) = record.get_mut(tag) else {
			continue;
		};
		let Some(current) = count(element) else {
			continue;
		};
		let vr = element.vr().map(str::to_owned);
		*element = Element::Inline {
			vr,
			values: vec![Value::from(current + extra)],
		};
	}
}

fn count(element: &Element) -> Option<u64> {
	match element.first_value()? {
		Value::Number(number) => number.as_u64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}
