mod config;
mod rehearse;

use cartridge::spec::{
    check_determined, check_env_vars, check_specs, requested_gear_sizes, AttachRequest,
};
use clap::{Parser, Subcommand};
use config::{Config, MetricsConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gantry", about = "Cartridge lifecycle tooling")]
struct Cli {
    /// Path to the gantry configuration file.
    #[arg(long, short, default_value = "gantry.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Load the configuration and report problems.
    CheckConfig,
    /// Normalize and validate an attach-request payload file, printing the
    /// canonical specification sequence.
    LintRequest { path: PathBuf },
    /// Run an attachment request against an application snapshot without
    /// touching any real infrastructure.
    Rehearse { path: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("gantry: {err}");
            return ExitCode::FAILURE;
        }
    };

    // The guard has to stay alive for the rest of the process.
    let _sentry = config.common.logging.as_ref().map(|logging| {
        sentry::init((logging.sentry_dsn.clone(), sentry::ClientOptions::default()))
    });

    if let Some(metrics_config) = &config.common.metrics
        && let Err(err) = install_statsd(metrics_config)
    {
        eprintln!("gantry: could not install statsd exporter: {err}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        CliCommand::CheckConfig => {
            println!(
                "configuration ok: {} gear sizes, {} catalog entries",
                config.gear_sizes.allowed.len(),
                config.catalog.len()
            );
            ExitCode::SUCCESS
        }
        CliCommand::LintRequest { path } => lint_request(&config, &path),
        CliCommand::Rehearse { path } => rehearse::run(&config, &path),
    }
}

fn install_statsd(metrics_config: &MetricsConfig) -> Result<(), String> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some("gantry"))
    .map_err(|err| err.to_string())?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| "a global metrics recorder is already installed".to_string())?;

    shared::metrics_defs::describe_all(cartridge::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(lifecycle::metrics_defs::ALL_METRICS);
    Ok(())
}

fn lint_request(config: &Config, path: &Path) -> ExitCode {
    match lint(config, path) {
        Ok(rendered) => {
            print!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("gantry: {message}");
            ExitCode::FAILURE
        }
    }
}

fn lint(config: &Config, path: &Path) -> Result<String, String> {
    let text = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let request: AttachRequest = serde_yaml::from_str(&text).map_err(|err| err.to_string())?;

    if let Some(vars) = &request.environment_variables {
        check_env_vars(vars).map_err(|err| err.to_string())?;
    }
    let specs = request.normalize();
    check_specs(&specs).map_err(|err| err.to_string())?;
    check_determined(&specs).map_err(|err| err.to_string())?;
    config
        .gear_size_policy()
        .check(requested_gear_sizes(&specs))
        .map_err(|err| err.to_string())?;

    serde_yaml::to_string(&specs).map_err(|err| err.to_string())
}
