//! Binary entry point for the cuttlehost CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use cuttlehost::config::ConfigError;
use cuttlehost::device::{BuildSelector, DeviceSpecError, ExtraBuilds, ImageSource, RemoteBuild};
use cuttlehost::{CreateReport, DeviceFactory, DeviceSpec, FactoryArtifacts, HostConfig, local_fs};

mod cli;

use cli::{Cli, CreateCommand};

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "CUTTLEHOST_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid device specification: {0}")]
    Spec(#[from] DeviceSpecError),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to write report to {path}: {message}")]
    WriteReport { path: Utf8PathBuf, message: String },
    #[error("failed to inspect local image {path}: {message}")]
    LocalImage { path: Utf8PathBuf, message: String },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Create(command) => create_command(&command).await,
    }
}

async fn create_command(args: &CreateCommand) -> Result<i32, CliError> {
    let config = HostConfig::load_without_cli_args()?;
    config.validate()?;
    let (spec, artifacts) = device_spec(args, config)?;

    let factory = DeviceFactory::with_process_runner(spec, artifacts);
    let outcome = factory.create_instance().await;
    let report = CreateReport::from_outcome(factory.spec(), &outcome, &factory.failures());
    let rendered = report.to_json()?;

    match args.report_file {
        Some(ref path) => {
            let target = Utf8Path::new(path);
            local_fs::write_string(target, &rendered).map_err(|err| CliError::WriteReport {
                path: target.to_path_buf(),
                message: err.to_string(),
            })?;
        }
        None => {
            writeln!(io::stdout(), "{rendered}").ok();
        }
    }

    Ok(report.exit_code())
}

fn parse_selector(value: Option<&str>) -> Result<Option<BuildSelector>, DeviceSpecError> {
    value.map(str::parse).transpose()
}

fn device_spec(
    args: &CreateCommand,
    config: HostConfig,
) -> Result<(DeviceSpec, FactoryArtifacts), CliError> {
    let extra_builds = ExtraBuilds {
        system: parse_selector(args.system_build.as_deref())?,
        kernel: parse_selector(args.kernel_build.as_deref())?,
        bootloader: parse_selector(args.bootloader_build.as_deref())?,
        ota: parse_selector(args.ota_build.as_deref())?,
    };

    let mut artifacts = FactoryArtifacts {
        local_image: None,
        cvd_host_package: args.cvd_host_package.as_deref().map(Utf8PathBuf::from),
    };
    let mut builder = DeviceSpec::builder()
        .remote_host(args.host.as_str())
        .host_user(args.host_user.as_str())
        .host_ssh_private_key_path(args.host_ssh_private_key_path.clone())
        .extra_builds(extra_builds)
        .ins_timeout(Duration::from_secs(args.ins_timeout_secs))
        .boot_timeout(Duration::from_secs(args.boot_timeout_secs))
        .gpu(args.gpu.clone())
        .report_internal_ip(args.report_internal_ip)
        .config(config);

    if let Some(ref target) = args.build_target {
        builder = builder.remote_build(RemoteBuild {
            branch: args.branch.clone(),
            build_id: args.build_id.clone(),
            build_target: target.clone(),
        });
    }

    if let Some(ref image) = args.local_image {
        let path = Utf8PathBuf::from(image);
        builder = builder.image_source(ImageSource::Local);
        let is_dir = local_fs::is_dir(&path).map_err(|err| CliError::LocalImage {
            path: path.clone(),
            message: err.to_string(),
        })?;
        if is_dir {
            builder = builder.local_image_dir(Some(path));
        } else {
            artifacts.local_image = Some(path);
        }
    }

    Ok((builder.build()?, artifacts))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
