//! Transports that talk to the configured DICOMweb sources.

use crate::api::qido::QidoService;
use crate::api::wado::WadoService;
use crate::config::{HttpClientConfig, SourceConfig};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod dicomweb;
pub mod static_wado;

use dicomweb::{DicomWebQidoService, DicomWebWadoService};
use static_wado::{StaticQidoService, StaticWadoService};

/// Why a request to a single source failed.
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("request to {url} failed: {source}")]
	Http {
		url: String,
		#[source]
		source: reqwest::Error,
	},
	#[error("{url} responded with {status}")]
	Status { url: String, status: StatusCode },
	#[error("invalid DICOM-JSON from {url}: {source}")]
	Decode {
		url: String,
		#[source]
		source: serde_json::Error,
	},
	#[error("bulk data URI {uri} could not be resolved to an absolute URL")]
	UnresolvedBulkData { uri: String },
	#[error("no response within {0:?}")]
	Timeout(Duration),
}

/// Creates the query and retrieval transports of a source.
pub trait TransportFactory: Send + Sync {
	fn query_service(&self, source: Arc<SourceConfig>) -> Box<dyn QidoService>;
	fn retrieval_service(&self, source: Arc<SourceConfig>) -> Box<dyn WadoService>;
}

/// Builds HTTP transports that share one connection pool.
///
/// Static sources get the filterless implementations, which evaluate the query on the
/// client instead of relying on the server.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
	http: reqwest::Client,
}

impl HttpTransportFactory {
	pub fn new(config: &HttpClientConfig) -> Result<Self, reqwest::Error> {
		let http = reqwest::Client::builder()
			.connect_timeout(config.connect_timeout())
			.timeout(config.request_timeout())
			.user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { http })
	}

	pub const fn with_client(http: reqwest::Client) -> Self {
		Self { http }
	}
}

impl TransportFactory for HttpTransportFactory {
	fn query_service(&self, source: Arc<SourceConfig>) -> Box<dyn QidoService> {
		let service = DicomWebQidoService::new(self.http.clone(), Arc::clone(&source));
		if source.is_static {
			Box::new(StaticQidoService::new(service))
		} else {
			Box::new(service)
		}
	}

	fn retrieval_service(&self, source: Arc<SourceConfig>) -> Box<dyn WadoService> {
		let service = DicomWebWadoService::new(self.http.clone(), Arc::clone(&source));
		if source.is_static {
			Box::new(StaticWadoService::new(service))
		} else {
			Box::new(service)
		}
	}
}
