//! Governance graph command line interface
//!
//! Compiles the requirements and hierarchy documents into a provisioning
//! template.
//!
//! # Usage
//!
//! ```bash
//! # Write the template
//! govgraph synth --out cdk.out/template.json
//!
//! # Show provisioning phases without writing anything
//! govgraph plan
//!
//! # Build the graph and report diagnostics only
//! govgraph validate --requirements config/datazone_basic_requirements.yaml
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use govgraph::config::{load_hierarchy, load_requirements, TemplateVars};
use govgraph::{synthesize, ProvisioningBackend, ProvisioningOutput, TemplateBackend};

#[derive(Parser)]
#[command(name = "govgraph")]
#[command(version = "0.1.0")]
#[command(about = "Compile a data-governance hierarchy into a provisioning template")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Resource requirements document
    #[arg(
        long,
        global = true,
        default_value = "config/datazone_basic_requirements.yaml"
    )]
    requirements: PathBuf,

    /// Domain hierarchy document
    #[arg(long, global = true, default_value = "config/domain_hierarchy.yaml")]
    hierarchy: PathBuf,

    /// Target account id substituted into the documents
    #[arg(long, global = true, env = "CDK_DEFAULT_ACCOUNT")]
    account: Option<String>,

    /// Target region substituted into the documents
    #[arg(long, global = true, env = "CDK_DEFAULT_REGION", default_value = "us-west-2")]
    region: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize and write the provisioning template
    Synth {
        /// Output file
        #[arg(short, long, default_value = "cdk.out/template.json")]
        out: PathBuf,
    },

    /// Print the provisioning phases
    Plan,

    /// Build the graph and report diagnostics
    Validate,
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Synth { out } => cmd_synth(&cli, out).await,
        Commands::Plan => cmd_plan(&cli),
        Commands::Validate => cmd_validate(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_synth(cli: &Cli, out: &Path) -> Result<()> {
    let output = build(cli)?;
    let report = TemplateBackend::new(out).apply(&output).await?;

    println!(
        "{} Wrote {} resource(s) in {} phase(s) to {}",
        "OK".green().bold(),
        report.resources,
        report.phases,
        out.display()
    );
    print_diagnostics(&output);
    Ok(())
}

fn cmd_plan(cli: &Cli) -> Result<()> {
    let output = build(cli)?;
    println!("{}", output.describe());
    print_diagnostics(&output);
    Ok(())
}

fn cmd_validate(cli: &Cli) -> Result<()> {
    let output = build(cli)?;
    println!(
        "{} {} resource(s), {} dependency edge(s), {} unit(s)",
        "OK".green().bold(),
        output.graph().len(),
        output.graph().edge_count(),
        output.units.iter().map(|u| u.flatten().len()).sum::<usize>()
    );
    print_diagnostics(&output);
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn build(cli: &Cli) -> Result<ProvisioningOutput> {
    let vars = TemplateVars::new(cli.account.clone(), Some(cli.region.clone()));
    let requirements = load_requirements(&cli.requirements, &vars)
        .with_context(|| format!("loading {}", cli.requirements.display()))?;
    let hierarchy = load_hierarchy(&cli.hierarchy, &vars)
        .with_context(|| format!("loading {}", cli.hierarchy.display()))?;
    Ok(synthesize(&requirements, &hierarchy)?)
}

fn print_diagnostics(output: &ProvisioningOutput) {
    let diagnostics = output.diagnostics();
    if diagnostics.is_empty() {
        return;
    }
    println!();
    println!("{} ({}):", "Diagnostics".yellow().bold(), diagnostics.len());
    for d in diagnostics.iter() {
        println!("  {} [{}] {}: {}", "warning".yellow(), d.kind, d.subject, d.message);
    }
}
