//! hg-sync
//!
//! Builds a Foreman/Satellite hostgroup tree from a YAML declaration:
//! - optional teardown of every existing hostgroup
//! - creation (or in-place update) of the declared tree
//! - bulk parameter application through combos

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use hg_api::ForemanClient;
use hg_core::{Settings, SettingsOverrides};
use hg_reconcile::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "hg-sync")]
#[command(about = "Create Satellite/Foreman hostgroup trees from a YAML declaration")]
struct Args {
    /// Hostgroup declaration
    #[arg(short, long, default_value = "hostgroups.yaml")]
    config: PathBuf,

    /// Satellite/Foreman base URI
    #[arg(short = 'U', long)]
    uri: Option<String>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(short, long)]
    pass: Option<String>,

    /// Organization every request is scoped to
    #[arg(short, long = "organization-id")]
    organization_id: Option<String>,

    /// Per-request timeout in seconds (0 or less disables it)
    #[arg(short, long, allow_hyphen_values = true)]
    timeout: Option<i64>,

    /// Page size for listings
    #[arg(long)]
    per_page: Option<u32>,

    /// Verify the server's TLS certificate
    #[arg(long)]
    verify_ssl: bool,

    /// Delete every hostgroup before building the tree
    #[arg(long)]
    teardown: bool,

    /// Update existing hostgroups instead of failing
    #[arg(long)]
    update: bool,

    #[arg(long)]
    skip_creation: bool,

    #[arg(long)]
    skip_combos: bool,

    /// Show what would be done without writing anything
    #[arg(short, long)]
    noop: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// CLI layer; unset flags leave lower layers alone
    fn overrides(&self) -> SettingsOverrides {
        let flag = |set: bool| set.then_some(true);
        SettingsOverrides {
            uri: self.uri.clone(),
            user: self.user.clone(),
            pass: self.pass.clone(),
            organization_id: self.organization_id.clone(),
            timeout: self.timeout,
            per_page: self.per_page,
            verify_ssl: flag(self.verify_ssl),
            teardown: flag(self.teardown),
            update: flag(self.update),
            skip_creation: flag(self.skip_creation),
            skip_combos: flag(self.skip_combos),
            noop: flag(self.noop),
            verbose: flag(self.verbose),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("hg_sync={}", level).parse()?)
                .add_directive(format!("hg_reconcile={}", level).parse()?)
                .add_directive(format!("hg_api={}", level).parse()?)
                .add_directive(format!("hg_core={}", level).parse()?),
        )
        .init();
    Ok(())
}

fn report_error(err: &anyhow::Error) {
    error!("{}", err);
    if let Some(err) = err.downcast_ref::<hg_core::Error>() {
        if err.needs_update_mode() {
            warn!("Hostgroups from an earlier run are still present");
        }
        info!("Suggestion: {}", err.suggestion());
    }
}

async fn run(settings: &Settings, config: &DeclaredConfig) -> Result<()> {
    settings.validate()?;
    let client = ForemanClient::from_settings(settings)?;
    info!(
        "Connecting to {} as {} (organization {})",
        client.base_url(),
        settings.user,
        settings.organization_id
    );

    let report = Reconciler::new(Arc::new(client), settings).run(config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment from /etc/hg-sync/environment (if exists)
    let env_file = hg_core::config::load_environment();

    let args = Args::parse();
    let config = DeclaredConfig::load(&args.config).await;

    let yaml_layer = config
        .as_ref()
        .ok()
        .and_then(|c| c.settings.clone())
        .unwrap_or_default();
    let settings = Settings::layered([&yaml_layer, &SettingsOverrides::from_env(), &args.overrides()]);

    // the subscriber needs settings.verbose, so env loading is reported here
    init_tracing(settings.verbose)?;
    match env_file {
        Some(path) => info!("Loaded environment from {}", path),
        None => debug!("No environment file found, using existing environment"),
    }

    let outcome = match config {
        Ok(config) => run(&settings, &config).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = outcome {
        report_error(&e);
        std::process::exit(1);
    }
    Ok(())
}
