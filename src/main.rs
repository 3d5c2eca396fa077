use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub mod arm;
pub mod config;
pub mod fetchers;
pub mod firewall;
pub mod naming;
pub mod renderer;
pub mod spec;

use crate::config::RunConfig;
use crate::fetchers::FetchContext;
use crate::naming::{ResourceGroups, ResourceKind, ResourceNames};
use crate::renderer::RenderSettings;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Arm(#[from] arm::Error),

    #[error(transparent)]
    Fetch(#[from] fetchers::Error),

    #[error(transparent)]
    Render(#[from] renderer::Error),
}

#[derive(Parser)]
#[command(
    name = "arm-spec-gen",
    about = "Generate resource specification documents from Azure management APIs",
    version
)]
struct Cli {
    /// Path to the run configuration file
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// Fetch all resources and render the document (default)
    Run,
    /// Print the resolved configuration
    Config,
    /// Render the document from existing data files only
    Render,
    /// Print the resolved resource name and resource group mapping
    Discover,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(error) = dispatch(cli).await {
        error!(%error, "run aborted");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<(), Error> {
    let config = config::parse(&cli.config)?;

    match cli.action.unwrap_or(Action::Run) {
        Action::Run => {
            run(&config).await?;
        }
        Action::Config => {
            print_config(&config)?;
        }
        Action::Render => {
            render_stage(&config)?;
        }
        Action::Discover => {
            print_discovery(&config)?;
        }
    }

    return Ok(());
}

async fn run(config: &RunConfig) -> Result<(), Error> {
    let base = config.resolved_base_name()?;
    let names = ResourceNames::resolve(&base, &config.names);
    let groups = ResourceGroups::resolve(&base, &config.names.resource_group, &config.resource_groups);

    let transport = arm::HttpTransport::new()?;
    let client = arm::ArmClient::new(Arc::new(transport), config.subscription());

    let ctx = FetchContext {
        client: &client,
        names: &names,
        groups: &groups,
        output_dir: &config.output_dir,
        database: &config.database,
    };

    // all fetchers complete (or fail) before any rendering happens
    fetchers::run_all(&ctx).await?;
    render_stage(config)?;

    return Ok(());
}

fn render_stage(config: &RunConfig) -> Result<(), Error> {
    let base = config.resolved_base_name()?;

    let documents = if config.document.auto_discover {
        renderer::discover(&config.output_dir)?
    } else {
        renderer::load_manual(&config.output_dir, &config.document.sections)?
    };

    let settings = RenderSettings {
        output_path: config.document.output_path.clone(),
        title: config.document.title.clone(),
        client: config.document.client.clone(),
        architecture_image: config.document.architecture_image.clone(),
        base_name: base,
    };

    renderer::render(&settings, &documents)?;
    return Ok(());
}

fn print_config(config: &RunConfig) -> Result<(), Error> {
    let base = config.resolved_base_name()?;
    let names = ResourceNames::resolve(&base, &config.names);

    println!("subscription:      {}", config.redacted_subscription());
    println!("base name:         {}", base);
    println!("output directory:  {}", config.output_dir.display());
    println!("document path:     {}", config.document.output_path.display());
    println!("auto discovery:    {}", config.document.auto_discover);
    println!("web app:           {}", names.web_app);
    println!("app service plan:  {}", names.app_service_plan);
    println!("sql server:        {}", names.sql_server);
    println!("sql database:      {}", names.sql_database);
    println!("cache:             {}", names.cache);
    println!("storage account:   {}", names.storage_account);

    return Ok(());
}

fn print_discovery(config: &RunConfig) -> Result<(), Error> {
    let base = config.resolved_base_name()?;
    let names = ResourceNames::resolve(&base, &config.names);
    let groups = ResourceGroups::resolve(&base, &config.names.resource_group, &config.resource_groups);

    info!(base = %base, "resolved resource group mapping");
    for kind in ResourceKind::all() {
        let resource = match kind {
            ResourceKind::WebApp => names.web_app.clone(),
            ResourceKind::Database => format!("{}/{}", names.sql_server, names.sql_database),
            ResourceKind::Cache => names.cache.clone(),
            ResourceKind::Storage => names.storage_account.clone(),
            ResourceKind::Alerts => String::from("<subscription-wide>"),
        };
        println!("{:<10} {:<50} {}", kind.to_string(), resource, groups.for_kind(kind));
    }

    return Ok(());
}
