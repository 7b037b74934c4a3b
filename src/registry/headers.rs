use crate::config::SourceConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::sync::Arc;
use tracing::warn;

/// Supplies the `Authorization` header value, e.g. a bearer token that is refreshed
/// elsewhere. Called once per request batch.
pub trait AuthorizationProvider: Send + Sync {
	fn authorization(&self) -> Option<String>;
}

impl<F> AuthorizationProvider for F
where
	F: Fn() -> Option<String> + Send + Sync,
{
	fn authorization(&self) -> Option<String> {
		self()
	}
}

/// A fixed `Authorization` value, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorization(pub Option<String>);

impl AuthorizationProvider for StaticAuthorization {
	fn authorization(&self) -> Option<String> {
		self.0.clone()
	}
}

pub type SharedAuthorization = Arc<dyn AuthorizationProvider>;

/// Headers for QIDO-RS requests: only `Authorization`, when the provider has one.
pub fn query_headers(auth: &dyn AuthorizationProvider) -> HeaderMap {
	let mut headers = HeaderMap::new();
	if let Some(value) = auth.authorization() {
		match HeaderValue::from_str(&value) {
			Ok(mut value) => {
				value.set_sensitive(true);
				headers.insert(AUTHORIZATION, value);
			}
			Err(err) => warn!("Omitting invalid Authorization header: {err}"),
		}
	}
	headers
}

/// Headers for WADO-RS requests: `Authorization` plus the `Accept` header of the source.
pub fn retrieval_headers(auth: &dyn AuthorizationProvider, source: &SourceConfig) -> HeaderMap {
	with_accept(query_headers(auth), source)
}

/// Adds the `Accept` header of `source` to already computed query headers.
pub fn with_accept(mut headers: HeaderMap, source: &SourceConfig) -> HeaderMap {
	let accept = accept_header(source);
	match HeaderValue::from_str(&accept) {
		Ok(value) => {
			headers.insert(ACCEPT, value);
		}
		Err(err) => warn!(source = %source.name, accept, "Omitting invalid Accept header: {err}"),
	}
	headers
}

/// The `Accept` header for frame and bulk data retrievals from `source`.
///
/// An explicit list in the configuration wins. Static sources cannot negotiate and get
/// `*/*`. Everything else asks for the configured transfer syntax, either as a single part
/// or wrapped in multipart/related. The transfer syntax defaults to `*`.
pub fn accept_header(source: &SourceConfig) -> String {
	if !source.accept_header.is_empty() {
		return source.accept_header.join(", ");
	}
	if source.is_static {
		return String::from("*/*");
	}

	let transfer_syntax = source.request_transfer_syntax_uid.as_deref().unwrap_or("*");
	if source.use_single_part_responses {
		format!("application/octet-stream; transfer-syntax={transfer_syntax}, image/*, application/*")
	} else if source.omit_quotation_for_multipart_request {
		format!("multipart/related; type=application/octet-stream; transfer-syntax={transfer_syntax}")
	} else {
		format!("multipart/related; type=\"application/octet-stream\"; transfer-syntax={transfer_syntax}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn source() -> SourceConfig {
		SourceConfig::new("pacs", "http://h/qido", "http://h/wado")
	}

	#[test]
	fn multipart_accept_by_default() {
		assert_eq!(
			accept_header(&source()),
			"multipart/related; type=\"application/octet-stream\"; transfer-syntax=*"
		);

		let unquoted = SourceConfig {
			omit_quotation_for_multipart_request: true,
			request_transfer_syntax_uid: Some(String::from("1.2.840.10008.1.2.1")),
			..source()
		};
		assert_eq!(
			accept_header(&unquoted),
			"multipart/related; type=application/octet-stream; transfer-syntax=1.2.840.10008.1.2.1"
		);
	}

	#[test]
	fn single_part_accept() {
		let single = SourceConfig {
			use_single_part_responses: true,
			..source()
		};
		assert_eq!(
			accept_header(&single),
			"application/octet-stream; transfer-syntax=*, image/*, application/*"
		);
	}

	#[test]
	fn static_and_explicit_accept() {
		let static_source = SourceConfig {
			is_static: true,
			..source()
		};
		assert_eq!(accept_header(&static_source), "*/*");

		let explicit = SourceConfig {
			accept_header: vec![String::from("image/jls"), String::from("*/*")],
			..static_source
		};
		assert_eq!(accept_header(&explicit), "image/jls, */*");
	}

	#[test]
	fn authorization_is_optional() {
		assert!(query_headers(&StaticAuthorization(None)).is_empty());

		let headers = query_headers(&|| Some(String::from("Bearer abc")));
		assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
		assert!(headers.get(ACCEPT).is_none());
	}

	#[test]
	fn invalid_authorization_is_omitted() {
		let headers = query_headers(&StaticAuthorization(Some(String::from("Bearer \n"))));
		assert!(headers.get(AUTHORIZATION).is_none());
	}

	#[test]
	fn retrieval_headers_carry_accept() {
		let headers = retrieval_headers(&StaticAuthorization(Some(String::from("Basic x"))), &source());
		assert_eq!(headers.len(), 2);
		assert!(headers.get(ACCEPT).is_some());
	}
}
