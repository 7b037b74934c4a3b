//! Registry of the configured sources and their transports.

mod headers;
mod route;

pub use headers::*;
pub use route::*;

use crate::api::qido::QidoService;
use crate::api::wado::WadoService;
use crate::backend::TransportFactory;
use crate::config::SourceConfig;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered source with its query and retrieval transports.
pub struct ClientHandle {
	pub config: Arc<SourceConfig>,
	pub qido: Box<dyn QidoService>,
	pub wado: Box<dyn WadoService>,
}

impl ClientHandle {
	pub fn name(&self) -> &str {
		&self.config.name
	}
}

impl std::fmt::Debug for ClientHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientHandle")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

/// A handle paired with the headers for one batch of requests.
#[derive(Debug, Clone)]
pub struct PreparedClient {
	pub handle: Arc<ClientHandle>,
	pub headers: HeaderMap,
}

impl PreparedClient {
	pub fn name(&self) -> &str {
		self.handle.name()
	}

	pub fn config(&self) -> &SourceConfig {
		&self.handle.config
	}
}

/// The ordered set of sources. Registration order decides which source wins when several
/// return the same study or series.
pub struct ClientRegistry {
	handles: Vec<Arc<ClientHandle>>,
	factory: Arc<dyn TransportFactory>,
	auth: SharedAuthorization,
	on_configuration: Option<ConfigurationHook>,
	route: RouteParameters,
}

pub struct ClientRegistryBuilder {
	factory: Arc<dyn TransportFactory>,
	auth: SharedAuthorization,
	on_configuration: Option<ConfigurationHook>,
	route: RouteParameters,
}

impl ClientRegistryBuilder {
	#[must_use]
	pub fn authorization(mut self, auth: impl AuthorizationProvider + 'static) -> Self {
		self.auth = Arc::new(auth);
		self
	}

	/// Sets a hook that transforms every source configuration before it is registered.
	#[must_use]
	pub fn on_configuration(
		mut self,
		hook: impl Fn(SourceConfig, &RouteParameters) -> SourceConfig + Send + Sync + 'static,
	) -> Self {
		self.on_configuration = Some(Arc::new(hook));
		self
	}

	#[must_use]
	pub fn route(mut self, route: RouteParameters) -> Self {
		self.route = route;
		self
	}

	pub fn build(self, sources: Vec<SourceConfig>) -> ClientRegistry {
		let mut registry = ClientRegistry {
			handles: Vec::new(),
			factory: self.factory,
			auth: self.auth,
			on_configuration: self.on_configuration,
			route: self.route,
		};
		registry.rebuild(sources);
		registry
	}
}

impl ClientRegistry {
	pub fn builder(factory: impl TransportFactory + 'static) -> ClientRegistryBuilder {
		ClientRegistryBuilder {
			factory: Arc::new(factory),
			auth: Arc::new(StaticAuthorization(None)),
			on_configuration: None,
			route: RouteParameters::default(),
		}
	}

	/// Builds a registry without configuration hook.
	pub fn build(
		sources: Vec<SourceConfig>,
		factory: impl TransportFactory + 'static,
		auth: impl AuthorizationProvider + 'static,
	) -> Self {
		Self::builder(factory).authorization(auth).build(sources)
	}

	/// Replaces all handles. Sources without query or retrieval root are skipped.
	pub fn rebuild(&mut self, sources: Vec<SourceConfig>) {
		self.handles = sources
			.into_iter()
			.map(|config| match &self.on_configuration {
				Some(hook) => hook(config, &self.route),
				None => config,
			})
			.filter_map(|config| {
				if !config.is_complete() {
					warn!(source = %config.name, "Skipping source without query or retrieval root");
					return None;
				}

				let config = Arc::new(config);
				info!(
					source.name = %config.name,
					source.query_root = config.query_root(),
					source.retrieval_root = config.retrieval_root(),
					source.is_static = config.is_static,
					"Registered source"
				);
				Some(Arc::new(ClientHandle {
					qido: self.factory.query_service(Arc::clone(&config)),
					wado: self.factory.retrieval_service(Arc::clone(&config)),
					config,
				}))
			})
			.collect();
	}

	/// Every handle with freshly computed query headers. The authorization provider is
	/// asked once, so the whole batch carries the same token.
	pub fn query_clients(&self) -> Vec<PreparedClient> {
		let headers = query_headers(self.auth.as_ref());
		self.handles
			.iter()
			.map(|handle| PreparedClient {
				handle: Arc::clone(handle),
				headers: headers.clone(),
			})
			.collect()
	}

	/// Every handle with freshly computed retrieval headers. The authorization provider is
	/// asked once for the whole batch.
	pub fn retrieval_clients(&self) -> Vec<PreparedClient> {
		let headers = query_headers(self.auth.as_ref());
		self.handles
			.iter()
			.map(|handle| PreparedClient {
				handle: Arc::clone(handle),
				headers: with_accept(headers.clone(), &handle.config),
			})
			.collect()
	}

	/// The named handle, or the first one if no name is given.
	pub fn by_name(&self, name: Option<&str>) -> Option<Arc<ClientHandle>> {
		let handle = match name {
			Some(name) => self.handles.iter().find(|handle| handle.name() == name),
			None => self.handles.first(),
		};
		handle.cloned()
	}

	pub fn query_client(&self, name: Option<&str>) -> Option<PreparedClient> {
		self.by_name(name).map(|handle| self.prepare_query(&handle))
	}

	pub fn retrieval_client(&self, name: Option<&str>) -> Option<PreparedClient> {
		self.by_name(name).map(|handle| self.prepare_retrieval(&handle))
	}

	pub fn handles(&self) -> &[Arc<ClientHandle>] {
		&self.handles
	}

	pub fn len(&self) -> usize {
		self.handles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	fn prepare_query(&self, handle: &Arc<ClientHandle>) -> PreparedClient {
		PreparedClient {
			handle: Arc::clone(handle),
			headers: query_headers(self.auth.as_ref()),
		}
	}

	fn prepare_retrieval(&self, handle: &Arc<ClientHandle>) -> PreparedClient {
		PreparedClient {
			handle: Arc::clone(handle),
			headers: retrieval_headers(self.auth.as_ref(), &handle.config),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::HttpTransportFactory;
	use reqwest::header::{ACCEPT, AUTHORIZATION};
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn factory() -> HttpTransportFactory {
		HttpTransportFactory::with_client(reqwest::Client::new())
	}

	fn sources() -> Vec<SourceConfig> {
		vec![
			SourceConfig::new("a", "http://a/qido", "http://a/wado"),
			SourceConfig {
				retrieval_root: None,
				..SourceConfig::new("incomplete", "http://b/qido", "")
			},
			SourceConfig {
				is_static: true,
				..SourceConfig::new("c", "http://c/qido", "http://c/wado")
			},
		]
	}

	#[test]
	fn skip_incomplete_sources() {
		let registry = ClientRegistry::build(sources(), factory(), StaticAuthorization(None));
		let names: Vec<_> = registry.handles().iter().map(|h| h.name().to_owned()).collect();
		assert_eq!(names, vec!["a", "c"]);
	}

	#[test]
	fn lookup_by_name() {
		let registry = ClientRegistry::build(sources(), factory(), StaticAuthorization(None));
		assert_eq!(registry.by_name(Some("c")).unwrap().name(), "c");
		assert_eq!(registry.by_name(None).unwrap().name(), "a");
		assert!(registry.by_name(Some("incomplete")).is_none());
	}

	#[test]
	fn authorization_is_shared_per_batch() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let registry = ClientRegistry::builder(factory())
			.authorization(move || {
				let n = counter.fetch_add(1, Ordering::SeqCst);
				Some(format!("Bearer {n}"))
			})
			.build(sources());

		let first = registry.query_clients();
		let second = registry.retrieval_clients();
		assert_eq!(calls.load(Ordering::SeqCst), 2);

		for client in &first {
			assert_eq!(client.headers.get(AUTHORIZATION).unwrap(), "Bearer 0");
			assert!(client.headers.get(ACCEPT).is_none());
		}
		for client in &second {
			assert_eq!(client.headers.get(AUTHORIZATION).unwrap(), "Bearer 1");
			assert!(client.headers.get(ACCEPT).is_some());
		}
		assert_eq!(registry.query_client(Some("c")).unwrap().headers.get(AUTHORIZATION).unwrap(), "Bearer 2");
	}

	#[test]
	fn retrieval_headers_follow_the_source() {
		let registry = ClientRegistry::build(sources(), factory(), StaticAuthorization(None));
		let clients = registry.retrieval_clients();
		assert!(clients[0].headers.get(AUTHORIZATION).is_none());
		assert_eq!(
			clients[0].headers.get(ACCEPT).unwrap(),
			"multipart/related; type=\"application/octet-stream\"; transfer-syntax=*"
		);
		assert_eq!(clients[1].headers.get(ACCEPT).unwrap(), "*/*");
	}

	#[test]
	fn configuration_hook_runs_before_validation() {
		let route = RouteParameters {
			params: std::collections::HashMap::from([(String::from("project"), String::from("p1"))]),
			..RouteParameters::default()
		};
		let registry = ClientRegistry::builder(factory())
			.route(route)
			.on_configuration(|config, route| {
				let mut config = substitute_route_parameters(config, route);
				if config.retrieval_root.is_none() {
					config.retrieval_root = config.query_root.clone();
				}
				config
			})
			.build(vec![SourceConfig {
				retrieval_root: None,
				..SourceConfig::new("x", "http://x/{project}/dicomweb", "")
			}]);

		assert_eq!(registry.len(), 1);
		let handle = registry.by_name(Some("x")).unwrap();
		assert_eq!(handle.config.retrieval_root(), "http://x/p1/dicomweb");
	}

	#[test]
	fn rebuild_replaces_handles() {
		let mut registry = ClientRegistry::build(sources(), factory(), StaticAuthorization(None));
		registry.rebuild(vec![SourceConfig::new("z", "http://z/qido", "http://z/wado")]);
		assert_eq!(registry.len(), 1);
		assert_eq!(registry.by_name(None).unwrap().name(), "z");
		registry.rebuild(Vec::new());
		assert!(registry.is_empty());
	}
}
