use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cleaner_agents::agents::analyzer::{build_analyzer, LlmClassifier};
use cleaner_agents::agents::resolver::{build_resolver, AgentResolver, ConsoleResolver};
use cleaner_agents::app::{clean_file, prompt_for_input, render_hints, require_input};
use cleaner_agents::config::{check_endpoint, CleanerConfig};
use cleaner_agents::handoff::{Handoff, StdinHandoff};
use cleaner_agents::telemetry::{self, TraceExport, OTLP_ENDPOINT_VAR};
use workflow::{Resolver, WorkflowError};

/// Which resolver answers escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ResolverKind {
    /// Step through each issue on the terminal.
    Console,
    /// Describe the fix in free text; the model applies it.
    Agent,
}

/// Clean a CSV table of contacts.
#[derive(Parser, Debug)]
#[command(name = "data-cleaner", version, about, long_about = None)]
struct Cli {
    /// Input CSV (asked for interactively when omitted)
    file: Option<PathBuf>,

    /// Log at info level (RUST_LOG overrides)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Export traces over OTLP (needs OTEL_EXPORTER_OTLP_ENDPOINT)
    #[arg(short = 'o', long, default_value_t = false)]
    observability: bool,

    /// TOML file overriding the environment settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ResolverKind::Console)]
    resolver: ResolverKind,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let export = TraceExport::from_env(cli.observability);
    let telemetry = match telemetry::init(cli.verbose, &export) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    match &export {
        TraceExport::Otlp { endpoint } => println!("\n✓ Observability enabled: {endpoint}\n"),
        TraceExport::MissingEndpoint => {
            println!("\nWarning: {OTLP_ENDPOINT_VAR} is not set; observability is disabled\n")
        }
        TraceExport::Disabled => {}
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            telemetry.shutdown();
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            let workflow_error = e.downcast_ref::<WorkflowError>();
            eprintln!("Error: {e:#}");
            eprint!(
                "{}",
                render_hints(workflow_error.map(WorkflowError::kind), &format!("{e:#}"))
            );
            workflow_error.map(WorkflowError::exit_code).unwrap_or(1)
        }
    };

    // A terminal read may still be parked on the blocking pool after Ctrl-C.
    runtime.shutdown_timeout(Duration::from_millis(100));
    telemetry.shutdown();
    ExitCode::from(code)
}

async fn run(cli: Cli) -> Result<u8> {
    let config = CleanerConfig::load(cli.config.as_deref())?;
    let client = config.build_client()?;
    info!(
        base_url = %config.base_url,
        model = %config.model,
        resolver = ?cli.resolver,
        "Data cleaner starting"
    );

    let handoff: Arc<dyn Handoff> = Arc::new(StdinHandoff);
    let input = match cli.file {
        Some(path) => {
            require_input(&path)?;
            path
        }
        None => match prompt_for_input(handoff.as_ref()).await? {
            Some(path) => path,
            None => {
                println!("Cancelled.");
                return Ok(0);
            }
        },
    };

    if !check_endpoint(&config.base_url, config.api_key.as_deref()).await {
        warn!(url = %config.base_url, "Model endpoint did not answer /models; continuing");
    }

    let classifier = Arc::new(LlmClassifier::new(build_analyzer(&client, &config)));
    let resolver: Arc<dyn Resolver> = match cli.resolver {
        ResolverKind::Console => Arc::new(ConsoleResolver::new(handoff.clone())),
        ResolverKind::Agent => Arc::new(AgentResolver::new(
            handoff.clone(),
            build_resolver(&client, &config),
        )),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    println!("\nProcessing {} ...\n", input.display());
    let run = clean_file(&input, &config.output_suffix, classifier, resolver, cancel).await?;

    if let Some(path) = &cli.report {
        run.report.write(path)?;
    }

    println!("============================================================");
    print!("{}", run.render());
    println!("============================================================");
    Ok(run.exit_code())
}
