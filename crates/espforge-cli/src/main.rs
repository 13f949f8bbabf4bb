//! espforge - ESPHome component catalog and configuration generator
//!
//! Crawls the ESPHome documentation into a local component catalog and
//! builds device configuration documents from projects of placed components.

mod catalog;
mod config;
mod documents;
mod projects;
mod state;

use anyhow::Result;
use clap::{Parser, Subcommand};
use espforge_scraper::CrawlState;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::projects::DeviceOverrides;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "espforge")]
#[command(about = "ESPHome component catalog and configuration generator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "espforge.toml")]
    config: PathBuf,

    /// Store directory (overrides the configuration file)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the documentation site into the catalog
    Scrape {
        /// Maximum number of component pages to visit
        #[arg(long)]
        max: Option<usize>,
        /// Listing page URL (overrides the configuration file)
        #[arg(long)]
        listing: Option<String>,
    },
    /// List catalog components
    List {
        #[arg(short = 't', long = "type")]
        component_type: Option<String>,
    },
    /// Search catalog components by name, description or type
    Search {
        query: String,
        #[arg(short = 't', long = "type")]
        component_type: Option<String>,
    },
    /// Show one catalog component, e.g. `sensor.dht`
    Show { key: String },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// Generate and store a project's configuration document
    Generate {
        project: String,
        /// Also write the document to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that a document file parses
    Validate { file: PathBuf },
    /// Deep-merge document files; later files win
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a secrets file template
    Secrets,
    /// Write the default configuration file
    InitConfig { path: Option<PathBuf> },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Create a project
    New {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        device_name: Option<String>,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        board: Option<String>,
    },
    /// Place a catalog component in a project
    Add { project: String, key: String },
    /// Set a variable on an instance; omit the value to clear it
    Set {
        project: String,
        instance: String,
        variable: String,
        value: Option<String>,
    },
    /// Remove an instance from a project
    Remove { project: String, instance: String },
    /// Show a project's components and problems
    Show { project: String },
    /// List projects
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Command output goes to stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&args.log_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("espforge v{}", env!("CARGO_PKG_VERSION"));

    // Commands that need no store
    match &args.command {
        Command::InitConfig { path } => {
            let path = path.clone().unwrap_or_else(|| args.config.clone());
            config::save_default_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(());
        }
        Command::Validate { file } => {
            println!("{}", documents::validate(file)?);
            return Ok(());
        }
        Command::Merge { files, output } => {
            let merged = documents::merge(files, output.as_deref())?;
            if output.is_none() {
                print!("{}", merged);
            }
            return Ok(());
        }
        Command::Secrets => {
            print!("{}", documents::secrets());
            return Ok(());
        }
        _ => {}
    }

    let mut config = config::load_config(&args.config)?;
    if let Some(store) = args.store {
        config.store.path = store;
    }
    let state = AppState::new(config)?;

    match args.command {
        Command::Scrape { max, listing } => {
            if let CrawlState::Failed { error } = catalog::scrape(&state, listing, max).await? {
                anyhow::bail!(error);
            }
        }
        Command::List { component_type } => {
            print!("{}", catalog::list(&state, component_type.as_deref()))
        }
        Command::Search {
            query,
            component_type,
        } => print!(
            "{}",
            catalog::search(&state, &query, component_type.as_deref())
        ),
        Command::Show { key } => print!("{}", catalog::show(&state, &key).await?),
        Command::Project { command } => run_project_command(&state, command).await?,
        Command::Generate { project, output } => {
            let (text, sha) = projects::generate(&state, &project, output.as_deref())?;
            match output {
                Some(path) => println!("Wrote {} (document {})", path.display(), &sha[..8]),
                None => print!("{}", text),
            }
        }
        Command::InitConfig { .. }
        | Command::Validate { .. }
        | Command::Merge { .. }
        | Command::Secrets => {}
    }

    Ok(())
}

fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

async fn run_project_command(state: &AppState, command: ProjectCommand) -> Result<()> {
    let message = match command {
        ProjectCommand::New {
            name,
            description,
            device_name,
            platform,
            board,
        } => projects::create(
            state,
            &name,
            description,
            DeviceOverrides {
                name: device_name,
                platform,
                board,
            },
        )?,
        ProjectCommand::Add { project, key } => projects::add(state, &project, &key).await?,
        ProjectCommand::Set {
            project,
            instance,
            variable,
            value,
        } => projects::set(state, &project, &instance, &variable, value)?,
        ProjectCommand::Remove { project, instance } => {
            projects::remove(state, &project, &instance)?
        }
        ProjectCommand::Show { project } => projects::show(state, &project)?,
        ProjectCommand::List => projects::list(state),
    };
    print!("{}", message);
    if !message.ends_with('\n') {
        println!();
    }
    Ok(())
}
