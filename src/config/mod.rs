mod source;

pub use source::*;

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub type ConfigError = config::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub http: HttpClientConfig,
	pub federation: FederationConfig,
	#[serde(default)]
	pub auth: AuthConfig,
	/// The data sources in registration order. Earlier sources win on duplicate records.
	#[serde(default)]
	pub sources: Vec<SourceConfig>,
}

impl AppConfig {
	/// Loads the configuration from the embedded defaults, an optional `config.toml` in the
	/// working directory and `DICOMWEB_FED_*` environment variables, in that order.
	pub fn new() -> Result<Self, ConfigError> {
		Self::load(None)
	}

	/// Same as [`AppConfig::new`], but reads the given file instead of `config.toml`.
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		Self::load(Some(path))
	}

	fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		use config::Config;

		let file = match path {
			Some(path) => config::File::from(path).required(true),
			None => config::File::with_name("config.toml").required(false),
		};

		Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(file)
			// Field names contain underscores, so nesting uses a double underscore:
			// DICOMWEB_FED_FEDERATION__QUERY_TIMEOUT=1000
			.add_source(
				config::Environment::with_prefix("DICOMWEB_FED")
					.prefix_separator("_")
					.separator("__"),
			)
			.build()?
			.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	// Configurable logging level. Also configurable via RUST_LOG and DICOMWEB_FED_TELEMETRY__LEVEL
	pub level: String,
	/// Sentry DSN. Tracing and error reporting to Sentry is disabled if unset.
	pub sentry: Option<String>,
}

impl TelemetryConfig {
	pub fn level_filter(&self) -> LevelFilter {
		LevelFilter::from_str(&self.level).unwrap_or(LevelFilter::INFO)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
	/// Timeout for a single HTTP request in milliseconds.
	pub request_timeout: u64,
	/// Timeout for establishing a connection in milliseconds.
	pub connect_timeout: u64,
}

impl HttpClientConfig {
	pub const fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout)
	}

	pub const fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
	/// Upper bound for one source's part of a federated query, in milliseconds.
	pub query_timeout: u64,
	/// Sum up study related series/instance counts of duplicate studies instead of
	/// keeping the first source's counts.
	pub aggregate_counts: bool,
	/// Whether the consuming application is served over HTTPS. Bulk data URIs are upgraded
	/// from `http:` to `https:` to avoid mixed content.
	pub secure_origin: bool,
}

impl FederationConfig {
	pub const fn query_timeout(&self) -> Duration {
		Duration::from_millis(self.query_timeout)
	}
}

impl Default for FederationConfig {
	fn default() -> Self {
		Self {
			query_timeout: 60_000,
			aggregate_counts: false,
			secure_origin: false,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
	/// Value of the `Authorization` header sent to every source, e.g. `Bearer <token>`.
	pub authorization: Option<String>,
}
