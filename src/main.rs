use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geo_assistant::config::Config;
use geo_assistant::session::AgentSession;
use geo_assistant::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "geo-assistant")]
#[command(about = "Execution planner for a geospatial data assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a request and print the resulting plan
    Plan {
        /// The natural-language request
        request: String,
        /// Tool catalogue to plan against (default: built-in tools)
        #[arg(long)]
        tools: Option<PathBuf>,
        /// Print the plan as JSON instead of the prompt addendum
        #[arg(long)]
        json: bool,
    },
    /// List available tools
    Tools {
        /// Tool catalogue to list (default: built-in tools)
        #[arg(long)]
        tools: Option<PathBuf>,
    },
    /// Resolve a layer name against a list of layer names
    MatchLayer {
        /// The name to look up
        name: String,
        /// Candidate layer names
        #[arg(required = true)]
        layers: Vec<String>,
    },
    /// Configure geo-assistant
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
        /// Set the match threshold (0-1)
        #[arg(long)]
        threshold: Option<f32>,
        /// Keep executing after a step fails
        #[arg(long)]
        continue_on_failure: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geo_assistant=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            request,
            tools,
            json,
        } => {
            plan_request(&request, tools.as_deref(), json)?;
        }
        Commands::Tools { tools } => {
            list_tools(tools.as_deref())?;
        }
        Commands::MatchLayer { name, layers } => {
            match_layer(&name, &layers)?;
        }
        Commands::Config {
            show,
            threshold,
            continue_on_failure,
        } => {
            handle_config(show, threshold, continue_on_failure)?;
        }
    }

    Ok(())
}

fn load_registry(path: Option<&Path>) -> Result<ToolRegistry> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read tool catalogue {}", path.display()))?;
            let registry = ToolRegistry::from_toml_str(&content)
                .with_context(|| format!("Invalid tool catalogue {}", path.display()))?;
            Ok(registry)
        }
        None => Ok(ToolRegistry::builtin()),
    }
}

fn plan_request(request: &str, tools: Option<&Path>, json: bool) -> Result<()> {
    let config = Config::load()?;
    let registry = load_registry(tools)?;
    let mut session = AgentSession::new(Arc::new(registry), config.planning);

    let plan = session.plan_request(request)?;
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
    } else {
        print!("{}", session.system_addendum());
    }

    Ok(())
}

fn list_tools(tools: Option<&Path>) -> Result<()> {
    let registry = load_registry(tools)?;
    if registry.is_empty() {
        println!("No tools registered.");
        return Ok(());
    }

    for tool in registry.tools() {
        println!("{:<20} {}", tool.name, tool.default_prompt);
    }

    Ok(())
}

fn match_layer(name: &str, layers: &[String]) -> Result<()> {
    let config = Config::load()?;
    let session = AgentSession::new(Arc::new(ToolRegistry::new()), config.planning);

    match session.find_layer(name, layers) {
        Some(layer) => println!("{}", layer),
        None => println!("no match"),
    }

    Ok(())
}

fn handle_config(show: bool, threshold: Option<f32>, continue_on_failure: Option<bool>) -> Result<()> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&Config::load()?)?);
        return Ok(());
    }

    // Environment overrides must not be written back to the file
    let mut config = Config::load_stored()?;

    let mut changed = false;

    if let Some(threshold) = threshold {
        config.planning.match_threshold = threshold;
        changed = true;
        println!("Match threshold updated");
    }

    if let Some(value) = continue_on_failure {
        config.planning.continue_on_failure = value;
        changed = true;
        println!("Continue-on-failure updated");
    }

    if changed {
        config.validate()?;
        config.save()?;
        println!("Configuration saved to: {:?}", Config::config_path()?);
    } else {
        println!("No changes made. Use --show to view current configuration.");
    }

    Ok(())
}
