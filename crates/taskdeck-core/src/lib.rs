pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod due;
pub mod error;
pub mod filter;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod view;
pub mod workspace;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::clock::SystemClock;
use crate::storage::FileStorage;

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
    "starting taskdeck"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage = FileStorage::open(
    &data_dir,
    &cfg.storage_key()
  )
  .with_context(|| {
    format!(
      "failed to open storage at {}",
      data_dir.display()
    )
  })?;
  let store = store::Store::open(storage)
    .context(
      "failed to load workspaces"
    )?;

  let mut session = session::Session::new(
    store,
    Arc::new(SystemClock),
    *datetime::project_timezone()
  );
  let mut selection = FileStorage::open(
    &data_dir,
    commands::SELECTION_KEY
  )?;
  commands::restore_selection(
    &mut session,
    &selection
  )?;

  let renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    &mut session,
    &mut selection,
    &cfg,
    &renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
