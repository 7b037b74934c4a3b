use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use dicomweb_federation::api::qido::{SeriesSummary, StudySearchParameters, StudySummary, DEFAULT_STUDY_LIMIT};
use dicomweb_federation::api::wado::{image_id, FramesRequest, InstanceUids};
use dicomweb_federation::config::AppConfig;
use dicomweb_federation::backend::HttpTransportFactory;
use dicomweb_federation::federation::{FederatedQueryExecutor, FederatedResult, SourceFailure};
use dicomweb_federation::registry::{substitute_route_parameters, ClientRegistry, RouteParameters, StaticAuthorization};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Queries several DICOMweb servers as if they were one.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	/// Configuration file. Defaults to config.toml in the working directory.
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Route parameter substituted into `{name}` placeholders of the source roots.
	#[arg(short = 'p', long = "param", value_parser = parse_key_value, global = true)]
	params: Vec<(String, String)>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Lists the registered sources.
	Sources,
	/// Searches studies on every source.
	Studies(StudiesArgs),
	/// Searches the series of a study on every source.
	Series {
		#[arg(long)]
		study: String,
		/// Print flattened summaries instead of DICOM JSON.
		#[arg(long)]
		summary: bool,
	},
	/// Retrieves the instance metadata of a study from every source.
	Metadata {
		#[arg(long)]
		study: String,
	},
	/// Retrieves frames of an instance from one source and writes them to files.
	Frames {
		#[command(flatten)]
		instance: InstanceArgs,
		#[arg(long = "frame", required = true)]
		frames: Vec<u32>,
		#[arg(short, long, default_value = ".")]
		output: PathBuf,
	},
	/// Prints the image id a viewer uses to load an instance.
	ImageId {
		#[command(flatten)]
		instance: InstanceArgs,
		#[arg(long)]
		frame: Option<u32>,
	},
}

#[derive(Debug, Args)]
struct StudiesArgs {
	#[arg(long)]
	patient_name: Option<String>,
	#[arg(long)]
	mrn: Option<String>,
	#[arg(long)]
	accession: Option<String>,
	#[arg(long)]
	description: Option<String>,
	#[arg(long)]
	modality: Option<String>,
	/// Earliest study date, YYYYMMDD.
	#[arg(long)]
	from: Option<String>,
	/// Latest study date, YYYYMMDD.
	#[arg(long)]
	to: Option<String>,
	#[arg(long = "study-uid")]
	study_uids: Vec<String>,
	#[arg(long, default_value_t = DEFAULT_STUDY_LIMIT)]
	limit: usize,
	#[arg(long, default_value_t = 0)]
	offset: usize,
	/// Print flattened summaries instead of DICOM JSON.
	#[arg(long)]
	summary: bool,
}

impl From<StudiesArgs> for StudySearchParameters {
	fn from(args: StudiesArgs) -> Self {
		Self {
			patient_name: args.patient_name,
			patient_id: args.mrn,
			accession_number: args.accession,
			study_description: args.description,
			modalities_in_study: args.modality,
			start_date: args.from,
			end_date: args.to,
			study_instance_uids: args.study_uids,
			limit: args.limit,
			offset: args.offset,
		}
	}
}

#[derive(Debug, Args)]
struct InstanceArgs {
	/// Source name. Defaults to the first registered source.
	#[arg(long)]
	source: Option<String>,
	#[arg(long)]
	study: String,
	#[arg(long)]
	series: String,
	#[arg(long)]
	instance: String,
}

impl InstanceArgs {
	fn uids(&self) -> InstanceUids {
		InstanceUids {
			study_instance_uid: self.study.clone(),
			series_instance_uid: self.series.clone(),
			sop_instance_uid: self.instance.clone(),
		}
	}
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
	input
		.split_once('=')
		.map(|(key, value)| (key.to_owned(), value.to_owned()))
		.ok_or_else(|| format!("expected NAME=VALUE, got {input}"))
}

fn init_logger(level: LevelFilter) {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::fmt::layer()
				.compact()
				.with_ansi(true)
				.with_file(false)
				.with_line_number(false)
				.with_target(false)
				.with_writer(std::io::stderr),
		)
		.with(
			EnvFilter::builder()
				.with_default_directive(level.into())
				.from_env_lossy(),
		)
		.with(sentry::integrations::tracing::layer())
		.init();
}

fn init_sentry(config: &AppConfig) -> sentry::ClientInitGuard {
	let guard = sentry::init((
		// An empty string will disable Sentry
		config.telemetry.sentry.as_deref().unwrap_or_default(),
		sentry::ClientOptions {
			release: sentry::release_name!(),
			traces_sample_rate: 1.0,
			..Default::default()
		},
	));

	if let Some(dsn) = &config.telemetry.sentry {
		info!(dsn, "Enabled Sentry for tracing and error tracking");
	};

	guard
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let cli = Cli::parse();
	let config = match &cli.config {
		Some(path) => AppConfig::from_file(path)?,
		None => AppConfig::new()?,
	};
	init_logger(config.telemetry.level_filter());

	// Manually create the Tokio runtime because the Sentry client needs to be created *before* the
	// Tokio runtime, which prevents us from using the #[tokio::main] macro.
	// See https://docs.sentry.io/platforms/rust/#async-main-function
	let _sentry = init_sentry(&config);

	let succeeded = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(async move {
			match run(cli, config).await {
				Ok(()) => true,
				Err(error) => {
					error!("{error:#}");
					false
				}
			}
		});

	if !succeeded {
		std::process::exit(1);
	}
	Ok(())
}

async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
	let factory = HttpTransportFactory::new(&config.http).context("Failed to build the HTTP client")?;
	let route = RouteParameters {
		params: cli.params.into_iter().collect::<HashMap<_, _>>(),
		..RouteParameters::default()
	};
	let registry = ClientRegistry::builder(factory)
		.authorization(StaticAuthorization(config.auth.authorization.clone()))
		.route(route)
		.on_configuration(substitute_route_parameters)
		.build(config.sources.clone());

	if registry.is_empty() {
		warn!("No complete source is configured");
	}

	let executor = FederatedQueryExecutor::new(&config.federation);

	match cli.command {
		Command::Sources => {
			let sources: Vec<_> = registry.handles().iter().map(|handle| handle.config.as_ref()).collect();
			print_json(&sources)?;
		}
		Command::Studies(args) => {
			let summary = args.summary;
			let result = executor.search_studies(&registry, &args.into()).await;
			report_failures(&result.failed_sources);
			print_records(&result, summary, StudySummary::from_record)?;
		}
		Command::Series { study, summary } => {
			let result = executor.search_series(&registry, &study).await;
			report_failures(&result.failed_sources);
			print_records(&result, summary, SeriesSummary::from_record)?;
		}
		Command::Metadata { study } => {
			let metadata = executor.study_metadata(&registry, &study).await;
			report_failures(&metadata.failed_sources);
			let datasets: Vec<_> = metadata.instances.iter().map(|instance| &instance.dataset).collect();
			print_json(&datasets)?;
		}
		Command::Frames {
			instance,
			frames,
			output,
		} => {
			let client = registry
				.retrieval_client(instance.source.as_deref())
				.ok_or_else(|| anyhow!("Unknown source {:?}", instance.source))?;
			let request = FramesRequest {
				instance: instance.uids(),
				frames: frames.clone(),
			};
			let parts = client.handle.wado.retrieve_frames(request, &client.headers).await?;

			tokio::fs::create_dir_all(&output).await?;
			for (number, part) in frames.iter().zip(&parts) {
				let path = output.join(format!("{}.{number}.bin", instance.instance));
				tokio::fs::write(&path, part)
					.await
					.with_context(|| format!("Failed to write {}", path.display()))?;
				info!(path = %path.display(), size = part.len(), "Wrote frame");
			}
			if parts.len() != frames.len() {
				warn!(requested = frames.len(), received = parts.len(), "Frame count mismatch");
			}
		}
		Command::ImageId { instance, frame } => {
			let handle = registry
				.by_name(instance.source.as_deref())
				.ok_or_else(|| anyhow!("Unknown source {:?}", instance.source))?;
			println!("{}", image_id(&handle.config, &instance.uids(), frame));
		}
	}

	Ok(())
}

fn report_failures(failures: &[SourceFailure]) {
	for failure in failures {
		warn!(source = %failure.source, reason = %failure.reason, "Source did not contribute");
	}
}

fn print_records<T: Serialize>(
	result: &FederatedResult,
	summary: bool,
	flatten: impl Fn(&dicomweb_federation::dataset::Dataset) -> T,
) -> anyhow::Result<()> {
	if summary {
		let summaries: Vec<T> = result.records.iter().map(flatten).collect();
		print_json(&summaries)
	} else {
		print_json(&result.records)
	}
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
