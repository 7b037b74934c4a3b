use crate::config::SourceConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Parameters of the route the registry is built for, e.g. a project id taken from the
/// viewer URL. Passed to the configuration hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParameters {
	/// Path parameters.
	pub params: HashMap<String, String>,
	/// Query string parameters.
	pub query: HashMap<String, String>,
}

impl RouteParameters {
	/// Looks up a value, preferring path parameters over query parameters.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.params
			.get(name)
			.or_else(|| self.query.get(name))
			.map(String::as_str)
	}
}

/// Transforms each source configuration once, before its transports are built.
pub type ConfigurationHook = Arc<dyn Fn(SourceConfig, &RouteParameters) -> SourceConfig + Send + Sync>;

/// Replaces `{name}` placeholders in the roots of `config` with route parameter values.
/// Placeholders without a matching parameter are kept.
pub fn substitute_route_parameters(mut config: SourceConfig, route: &RouteParameters) -> SourceConfig {
	for root in [
		&mut config.query_root,
		&mut config.retrieval_root,
		&mut config.retrieval_uri_root,
	]
	.into_iter()
	.flatten()
	{
		*root = substitute(root, route);
	}
	config
}

fn substitute(template: &str, route: &RouteParameters) -> String {
	let mut output = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(start) = rest.find('{') {
		let Some(length) = rest[start..].find('}') else {
			break;
		};
		let name = &rest[start + 1..start + length];
		output.push_str(&rest[..start]);
		match route.get(name) {
			Some(value) => output.push_str(value),
			None => output.push_str(&rest[start..=start + length]),
		}
		rest = &rest[start + length + 1..];
	}

	output.push_str(rest);
	output
}
