//! Client-side evaluation of query criteria against search results.
//!
//! Static DICOMweb sources serve precomputed result lists and ignore the query string,
//! so the results are filtered here instead.

use super::{FieldAliases, QuerySpec, QueryValue};
use crate::dataset::{Dataset, Element};
use dicom::core::VR;
use serde_json::Value;

const ALPHABETIC_KEY: &str = "Alphabetic";

/// Returns `true` if `record` satisfies every criterion of `query`.
///
/// Criteria for fields that are not in `aliases` are ignored, as are criteria for
/// attributes the record does not contain.
pub fn matches(record: &Dataset, query: &QuerySpec, aliases: &FieldAliases) -> bool {
	query.iter().all(|(field, desired)| {
		let Some(key) = aliases.resolve(field) else {
			return true;
		};
		record
			.get_key(&key)
			.is_none_or(|element| matches_element(element, desired))
	})
}

/// Keeps the records that satisfy `query`, preserving their order.
pub fn filter_records(records: Vec<Dataset>, query: &QuerySpec, aliases: &FieldAliases) -> Vec<Dataset> {
	records
		.into_iter()
		.filter(|record| matches(record, query, aliases))
		.collect()
}

fn matches_element(element: &Element, desired: &QueryValue) -> bool {
	let values = element.values();
	if values.is_empty() {
		return true;
	}

	if element.value_representation() == Some(VR::DA) {
		if let Some(date) = values[0].as_str() {
			return compare_date_range(desired, date);
		}
	}

	compare_values(desired, values)
}

/// Returns `true` if any desired value matches any of the actual values.
///
/// - An empty actual value matches anything.
/// - `*text*` and `text*` match when the actual value contains `text`, `*text` when it
///   ends with `text`. Wildcard matches ignore case.
/// - Everything else must be equal, including case.
/// - Person names are compared by their `Alphabetic` component.
/// - A backslash separates multiple desired values, as in a UID list.
pub fn compare_values(desired: &QueryValue, actual: &[Value]) -> bool {
	let matches_any = |desired: &str| {
		desired
			.split('\\')
			.any(|desired| actual.iter().any(|value| matches_value(desired, value)))
	};
	match desired {
		QueryValue::Single(desired) => matches_any(desired),
		QueryValue::Any(desired) => desired.iter().any(|desired| matches_any(desired)),
	}
}

/// Evaluates a `start-end` date range against a `YYYYMMDD` date. Either bound may be
/// empty. Values without a dash are compared like any other value.
pub fn compare_date_range(desired: &QueryValue, actual: &str) -> bool {
	match desired {
		QueryValue::Single(range) => in_date_range(range, actual),
		QueryValue::Any(ranges) => ranges.iter().any(|range| in_date_range(range, actual)),
	}
}

fn in_date_range(range: &str, actual: &str) -> bool {
	match range.split_once('-') {
		Some((start, end)) => {
			(start.is_empty() || actual >= start) && (end.is_empty() || actual <= end)
		}
		None => matches_str(range, actual),
	}
}

fn matches_value(desired: &str, actual: &Value) -> bool {
	match actual {
		Value::Null => true,
		Value::String(actual) => matches_str(desired, actual),
		Value::Number(actual) => matches_str(desired, &actual.to_string()),
		Value::Array(items) => items.iter().any(|item| matches_value(desired, item)),
		Value::Object(name) => name
			.get(ALPHABETIC_KEY)
			.and_then(Value::as_str)
			.is_some_and(|alphabetic| matches_str(desired, alphabetic)),
		Value::Bool(_) => false,
	}
}

fn matches_str(desired: &str, actual: &str) -> bool {
	if actual.is_empty() || desired.is_empty() || desired == "*" {
		return true;
	}

	let actual_lower = actual.to_lowercase();
	if desired.len() > 1 && desired.starts_with('*') && desired.ends_with('*') {
		actual_lower.contains(&desired[1..desired.len() - 1].to_lowercase())
	} else if let Some(prefix) = desired.strip_suffix('*') {
		actual_lower.contains(&prefix.to_lowercase())
	} else if let Some(suffix) = desired.strip_prefix('*') {
		actual_lower.ends_with(&suffix.to_lowercase())
	} else {
		desired == actual
	}
}
