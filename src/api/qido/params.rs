use super::{QueryParameters, QuerySpec};
use crate::config::SourceConfig;
use dicom::dictionary_std::tags;

/// Default page size of a study search. One more than a page of 100 so callers can tell
/// whether there are more results.
pub const DEFAULT_STUDY_LIMIT: usize = 101;

/// Used as the lower bound when a date range only has an end date.
const EARLIEST_STUDY_DATE: &str = "19700102";

/// Study search criteria in a server-independent form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudySearchParameters {
	pub patient_name: Option<String>,
	pub patient_id: Option<String>,
	pub accession_number: Option<String>,
	pub study_description: Option<String>,
	pub modalities_in_study: Option<String>,
	/// `YYYYMMDD`
	pub start_date: Option<String>,
	/// `YYYYMMDD`
	pub end_date: Option<String>,
	pub study_instance_uids: Vec<String>,
	pub limit: usize,
	pub offset: usize,
}

impl Default for StudySearchParameters {
	fn default() -> Self {
		Self {
			patient_name: None,
			patient_id: None,
			accession_number: None,
			study_description: None,
			modalities_in_study: None,
			start_date: None,
			end_date: None,
			study_instance_uids: Vec::new(),
			limit: DEFAULT_STUDY_LIMIT,
			offset: 0,
		}
	}
}

/// Translates study search criteria into QIDO-RS query parameters for one source.
///
/// Sources that support wildcards get `*value*` for name, ID and description so a partial
/// input still matches. `fuzzymatching` is only requested from sources that advertise it.
pub fn map_params(params: &StudySearchParameters, source: &SourceConfig) -> QueryParameters {
	let wildcard = |value: &str| {
		if source.supports_wildcard {
			format!("*{value}*")
		} else {
			value.to_owned()
		}
	};

	let mut criteria = QuerySpec::new();
	if let Some(name) = non_empty(params.patient_name.as_deref()) {
		criteria.push("PatientName", wildcard(name));
	}
	if let Some(id) = non_empty(params.patient_id.as_deref()) {
		criteria.push("PatientID", wildcard(id));
	}
	if let Some(accession) = non_empty(params.accession_number.as_deref()) {
		criteria.push("AccessionNumber", accession);
	}
	if let Some(description) = non_empty(params.study_description.as_deref()) {
		criteria.push("StudyDescription", wildcard(description));
	}
	if let Some(modalities) = non_empty(params.modalities_in_study.as_deref()) {
		criteria.push("ModalitiesInStudy", modalities);
	}
	if let Some(range) = date_range(
		non_empty(params.start_date.as_deref()),
		non_empty(params.end_date.as_deref()),
	) {
		criteria.push("StudyDate", range);
	}
	if let Some(uids) = uid_list(&params.study_instance_uids) {
		criteria.push("StudyInstanceUID", uids);
	}

	QueryParameters {
		match_criteria: criteria,
		fuzzy_matching: source.supports_fuzzy_matching,
		include_field: vec![tags::STUDY_DESCRIPTION, tags::MODALITY],
		limit: Some(params.limit),
		offset: params.offset,
	}
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|value| !value.is_empty())
}

fn date_range(start: Option<&str>, end: Option<&str>) -> Option<String> {
	match (start, end) {
		(Some(start), Some(end)) => Some(format!("{start}-{end}")),
		(Some(start), None) => Some(format!("{start}-")),
		(None, Some(end)) => Some(format!("{EARLIEST_STUDY_DATE}-{end}")),
		(None, None) => None,
	}
}

fn uid_list(uids: &[String]) -> Option<String> {
	let cleaned: Vec<String> = uids
		.iter()
		.map(|uid| {
			uid.chars()
				.filter(|c| c.is_ascii_digit() || *c == '.')
				.collect::<String>()
		})
		.filter(|uid| !uid.is_empty())
		.collect();
	(!cleaned.is_empty()).then(|| cleaned.join("\\"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::api::qido::QueryValue;

	fn source(wildcard: bool, fuzzy: bool) -> SourceConfig {
		SourceConfig {
			supports_wildcard: wildcard,
			supports_fuzzy_matching: fuzzy,
			..SourceConfig::new("pacs", "http://h/qido", "http://h/wado")
		}
	}

	fn value<'a>(params: &'a QueryParameters, field: &str) -> Option<&'a str> {
		match params.match_criteria.get(field)? {
			QueryValue::Single(value) => Some(value),
			QueryValue::Any(_) => None,
		}
	}

	#[test]
	fn wildcards_for_capable_sources() {
		let params = StudySearchParameters {
			patient_name: Some(String::from("doe")),
			patient_id: Some(String::from("42")),
			study_description: Some(String::from("chest")),
			accession_number: Some(String::from("A1")),
			..StudySearchParameters::default()
		};

		let mapped = map_params(&params, &source(true, false));
		assert_eq!(value(&mapped, "PatientName"), Some("*doe*"));
		assert_eq!(value(&mapped, "PatientID"), Some("*42*"));
		assert_eq!(value(&mapped, "StudyDescription"), Some("*chest*"));
		assert_eq!(value(&mapped, "AccessionNumber"), Some("A1"));
		assert!(!mapped.fuzzy_matching);

		let mapped = map_params(&params, &source(false, true));
		assert_eq!(value(&mapped, "PatientName"), Some("doe"));
		assert!(mapped.fuzzy_matching);
	}

	#[test]
	fn date_range_bounds() {
		let both = StudySearchParameters {
			start_date: Some(String::from("20200101")),
			end_date: Some(String::from("20201231")),
			..StudySearchParameters::default()
		};
		let start = StudySearchParameters {
			end_date: None,
			..both.clone()
		};
		let end = StudySearchParameters {
			start_date: None,
			..both.clone()
		};
		let source = source(false, false);

		assert_eq!(value(&map_params(&both, &source), "StudyDate"), Some("20200101-20201231"));
		assert_eq!(value(&map_params(&start, &source), "StudyDate"), Some("20200101-"));
		assert_eq!(value(&map_params(&end, &source), "StudyDate"), Some("19700102-20201231"));
	}

	#[test]
	fn study_uids_are_cleaned_and_joined() {
		let params = StudySearchParameters {
			study_instance_uids: vec![String::from(" 1.2.3 "), String::from("1.2.4\u{0}"), String::new()],
			..StudySearchParameters::default()
		};
		let mapped = map_params(&params, &source(false, false));
		assert_eq!(value(&mapped, "StudyInstanceUID"), Some("1.2.3\\1.2.4"));
	}

	#[test]
	fn defaults() {
		let mapped = map_params(&StudySearchParameters::default(), &source(true, true));
		assert!(mapped.match_criteria.is_empty());
		assert_eq!(mapped.limit, Some(DEFAULT_STUDY_LIMIT));
		assert_eq!(mapped.offset, 0);
		assert_eq!(mapped.include_field, vec![tags::STUDY_DESCRIPTION, tags::MODALITY]);
	}
}
