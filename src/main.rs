use anyhow::{anyhow, Context, Error, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bundle;
mod cli;
mod config;
mod exec;
mod fetch;
mod images;
mod patch;
mod render;
mod tools;
mod util;

use bundle::{KptMutator, LocalMutator};
use cli::{PatchBackend, RootArgs};
use config::DeployConfig;
use exec::{SystemRunner, ToolRunner};
use tools::Toolchain;

fn main() -> Result<()> {
    init_tracing();

    let args = match RootArgs::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                err.print().context("write usage error")?;
                std::process::exit(1);
            }
        },
    };

    // Validation is all-or-nothing and happens before any side effect.
    let config = DeployConfig::from_args(args).map_err(with_usage)?;
    let toolchain = Toolchain::discover().map_err(with_usage)?;
    info!(
        kpt = %toolchain.kpt.display(),
        yq = %toolchain.yq.display(),
        "validated required tools"
    );

    run(&config, &toolchain, &SystemRunner)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn with_usage(err: Error) -> Error {
    anyhow!("{err}\n\n{}", cli::usage())
}

fn run(config: &DeployConfig, toolchain: &Toolchain, runner: &dyn ToolRunner) -> Result<()> {
    let steps = patch::pipeline(config)?;

    if config.skip_kind_load {
        info!("skipping kind image load");
    } else {
        let kind = tools::locate_kind()?;
        info!(cluster = %config.kind_context, "loading images into kind");
        images::load_into_kind(
            runner,
            &kind,
            &config.kind_context,
            &config.images_to_load(),
        )?;
    }

    info!(
        source = %config.package_url,
        destination = %config.destination.display(),
        "fetching porch package"
    );
    let bundle = fetch::fetch_package(
        runner,
        &toolchain.kpt,
        &config.package_url,
        &config.package_dir(),
    )?;

    match config.patch_backend {
        PatchBackend::Kpt => {
            let mut mutator = KptMutator::new(runner, &toolchain.kpt, bundle.clone());
            patch::apply_all(&steps, &mut mutator)?;
        }
        PatchBackend::Local => {
            let mut mutator = LocalMutator::new(bundle.clone());
            patch::apply_all(&steps, &mut mutator)?;
        }
    }

    info!(path = %bundle.root().display(), "rendering porch package");
    render::render_package(runner, &toolchain.kpt, &bundle)?;

    if config.live_apply {
        info!("applying porch package to the current cluster");
        render::apply_live(runner, &toolchain.kpt, &bundle)?;
    }

    info!(path = %bundle.root().display(), "porch package ready");
    Ok(())
}
