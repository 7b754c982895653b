pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod draft;
pub mod error;
pub mod render;
pub mod state;
pub mod storage;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::TaskflowError;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskflow CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskflowrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let tz = datetime::init_project_timezone(
    cfg.timezone()
  );
  debug!(?tz, "project timezone");

  let data_dir =
    cfg.data_dir(cli.data.as_deref());

  let store =
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open store at {}",
          data_dir.display()
        )
      })?;

  let recover = cfg.recover_corrupt()?;
  if recover {
    store
      .recover_document()
      .context("failed to recover store")?;
  }
  let mut state =
    state::AppState::open(store, recover)
      .context("failed to load tasks")?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List(
        cli::ListArgs::default()
      )
    });

  let mut out = io::stdout().lock();
  commands::dispatch(
    &mut state,
    &cfg,
    &renderer,
    &mut out,
    command,
    datetime::today()
  )?;

  info!("done");
  Ok(())
}
