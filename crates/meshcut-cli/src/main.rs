use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meshcut_core::{ChangeSet, Config, Group, Operation, Report, ResourceKind};
use meshcut_dbt::{resolve_selection, CatalogLookup};
use meshcut_engine::{
    ContractStamper, FileManager, ModelVersioner, ResourceGrouper, SubprojectBuilder,
};

mod artifacts;

use artifacts::{CatalogMode, ProjectArtifacts};

/// Meshcut - split a dbt project into a mesh of subprojects
#[derive(Parser)]
#[command(name = "meshcut")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: <project>/meshcut.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root of the dbt project to operate on
    #[arg(short, long, global = true, default_value = ".")]
    project_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// Resources to operate on
    #[arg(short, long, required = true, num_args = 1..)]
    select: Vec<String>,

    /// Resources to leave out of the selection
    #[arg(short, long, num_args = 1..)]
    exclude: Vec<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Compute the changes without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Output file for report.json
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Reuse target/catalog.json instead of running 'dbt docs generate'
    #[arg(long)]
    read_catalog: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign the selection to an ownership group
    Group {
        /// Group name
        name: String,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Owner name for the group
        #[arg(long)]
        owner_name: Option<String>,

        /// Owner email for the group
        #[arg(long)]
        owner_email: Option<String>,

        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Move the selection into a new subproject
    Split {
        /// Subproject name
        name: String,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Directory for the new subproject (default: <project>/<name>)
        #[arg(long)]
        create_path: Option<PathBuf>,

        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Move the selection into an existing project
    Connect {
        /// Root of the receiving dbt project
        #[arg(short, long)]
        target: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Enforce contracts on the selected models
    Contract {
        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Add a version to the selected models
    Version {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Add the version without making it the latest
        #[arg(long)]
        prerelease: bool,

        /// File stem for the new version's code
        #[arg(long)]
        defined_in: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Group { .. } => "group",
            Self::Split { .. } => "split",
            Self::Connect { .. } => "connect",
            Self::Contract { .. } => "contract",
            Self::Version { .. } => "version",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let command = cli.command.name();

    let result = match cli.command {
        Commands::Group {
            name,
            selection,
            owner_name,
            owner_email,
            catalog,
            run,
        } => {
            let mut group = Group::new(name);
            if let Some(owner_name) = owner_name {
                group = group.with_owner_name(owner_name);
            }
            if let Some(owner_email) = owner_email {
                group = group.with_owner_email(owner_email);
            }
            group_command(&config, &cli.project_path, &group, &selection, &catalog, &run, cli.verbose)
        }
        Commands::Split {
            name,
            selection,
            create_path,
            catalog,
            run,
        } => split_command(
            &config,
            &cli.project_path,
            &name,
            create_path.as_deref(),
            &selection,
            &catalog,
            &run,
            cli.verbose,
        ),
        Commands::Connect {
            target,
            selection,
            catalog,
            run,
        } => connect_command(&config, &cli.project_path, &target, &selection, &catalog, &run, cli.verbose),
        Commands::Contract {
            selection,
            catalog,
            run,
        } => contract_command(&config, &cli.project_path, &selection, &catalog, &run, cli.verbose),
        Commands::Version {
            selection,
            prerelease,
            defined_in,
            run,
        } => version_command(
            &config,
            &cli.project_path,
            &selection,
            prerelease,
            defined_in.as_deref(),
            &run,
            cli.verbose,
        ),
    };

    result.with_context(|| format!("meshcut {command} failed"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        let default_path = cli.project_path.join("meshcut.toml");
        if default_path.exists() {
            Config::from_file(&default_path)
                .with_context(|| format!("Failed to load config from {}", default_path.display()))?
        } else {
            if cli.verbose {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Config::default()
        }
    };

    Ok(config.with_project_root(&cli.project_path))
}

fn catalog_mode(config: &Config, args: &CatalogArgs) -> CatalogMode {
    CatalogMode::from_flag(args.read_catalog || config.read_catalog)
}

fn resolve(artifacts: &ProjectArtifacts, args: &SelectionArgs) -> Result<BTreeSet<String>> {
    let select = args.select.join(" ");
    let exclude = (!args.exclude.is_empty()).then(|| args.exclude.join(" "));

    let selection = resolve_selection(&select, exclude.as_deref(), &artifacts.resources, &artifacts.graph)
        .with_context(|| format!("Failed to resolve selection '{select}'"))?;

    if selection.is_empty() {
        bail!("Selection '{select}' matched no resources");
    }

    tracing::debug!(count = selection.len(), "resolved selection");
    Ok(selection)
}

fn catalog_of(artifacts: &ProjectArtifacts) -> Option<&dyn CatalogLookup> {
    artifacts.catalog.as_ref().map(|catalog| catalog as &dyn CatalogLookup)
}

/// Group command - assign ownership and access
fn group_command(
    config: &Config,
    project_path: &Path,
    group: &Group,
    selection: &SelectionArgs,
    catalog: &CatalogArgs,
    run: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let artifacts = ProjectArtifacts::load(project_path, config, catalog_mode(config, catalog), verbose)?;
    let selection = resolve(&artifacts, selection)?;

    let mut grouper = ResourceGrouper::new(
        &artifacts.project.name,
        &artifacts.resources,
        &artifacts.graph,
        config,
    );
    if let Some(catalog) = catalog_of(&artifacts) {
        grouper = grouper.with_catalog(catalog);
    }

    let mut files = FileManager::in_place(&artifacts.project.root);
    let mut changes = ChangeSet::new();
    let interface = grouper
        .group(&selection, group, &mut files, &mut changes)
        .with_context(|| format!("Failed to create group '{}'", group.name))?;

    if verbose {
        eprintln!("{} {} public models", "Group interface:".cyan(), interface.len());
    }

    finish("group", &mut files, &changes, selection.len(), run)
}

/// Split command - move the selection into a new subproject
#[allow(clippy::too_many_arguments)]
fn split_command(
    config: &Config,
    project_path: &Path,
    name: &str,
    create_path: Option<&Path>,
    selection: &SelectionArgs,
    catalog: &CatalogArgs,
    run: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let artifacts = ProjectArtifacts::load(project_path, config, catalog_mode(config, catalog), verbose)?;
    let selection = resolve(&artifacts, selection)?;

    let target = create_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| artifacts.project.root.join(name));

    let mut builder = SubprojectBuilder::new(&artifacts.project, &artifacts.resources, &artifacts.graph, config);
    if let Some(catalog) = catalog_of(&artifacts) {
        builder = builder.with_catalog(catalog);
    }

    let mut files = FileManager::new(&artifacts.project.root, &target);
    let outcome = builder
        .split(&selection, name, &mut files)
        .with_context(|| format!("Failed to split '{name}' into {}", target.display()))?;

    if verbose {
        eprintln!(
            "{} {} moved, {} copied, {} skipped, {} public",
            "Relocated:".cyan(),
            outcome.moved.len(),
            outcome.copied.len(),
            outcome.skipped.len(),
            outcome.interface.len()
        );
    }

    finish("split", &mut files, &outcome.changes, selection.len(), run)
}

/// Connect command - move the selection into an existing project
fn connect_command(
    config: &Config,
    project_path: &Path,
    target: &Path,
    selection: &SelectionArgs,
    catalog: &CatalogArgs,
    run: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let artifacts = ProjectArtifacts::load(project_path, config, catalog_mode(config, catalog), verbose)?;
    let selection = resolve(&artifacts, selection)?;

    let mut builder = SubprojectBuilder::new(&artifacts.project, &artifacts.resources, &artifacts.graph, config);
    if let Some(catalog) = catalog_of(&artifacts) {
        builder = builder.with_catalog(catalog);
    }

    let mut files = FileManager::new(&artifacts.project.root, target);
    let outcome = builder
        .connect(&selection, &mut files)
        .with_context(|| format!("Failed to connect to {}", target.display()))?;

    finish("connect", &mut files, &outcome.changes, selection.len(), run)
}

/// Contract command - enforce contracts in place
fn contract_command(
    config: &Config,
    project_path: &Path,
    selection: &SelectionArgs,
    catalog: &CatalogArgs,
    run: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let artifacts = ProjectArtifacts::load(project_path, config, catalog_mode(config, catalog), verbose)?;
    let selection = resolve(&artifacts, selection)?;

    let mut files = FileManager::in_place(&artifacts.project.root);
    let mut changes = ChangeSet::new();
    let stamped = ContractStamper::new(config, catalog_of(&artifacts))
        .stamp_selection(
            &artifacts.resources,
            &selection,
            &artifacts.project.name,
            &mut files,
            &mut changes,
        )
        .context("Failed to enforce contracts")?;

    if verbose {
        eprintln!("{} {} models", "Contracted:".cyan(), stamped);
    }

    finish("contract", &mut files, &changes, selection.len(), run)
}

/// Version command - add a version to each selected model
fn version_command(
    config: &Config,
    project_path: &Path,
    selection: &SelectionArgs,
    prerelease: bool,
    defined_in: Option<&str>,
    run: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let artifacts = ProjectArtifacts::load(project_path, config, CatalogMode::Skip, verbose)?;
    let selection = resolve(&artifacts, selection)?;

    // Versioned models appear once per version; each model is bumped once
    let names: BTreeSet<&str> = selection
        .iter()
        .filter_map(|id| artifacts.resources.get(id))
        .filter(|r| r.kind == ResourceKind::Model && r.project == artifacts.project.name)
        .map(|r| r.name.as_str())
        .collect();

    if names.is_empty() {
        bail!("Selection contains no models of project '{}'", artifacts.project.name);
    }
    if defined_in.is_some() && names.len() > 1 {
        bail!("--defined-in can only be used with a single model");
    }

    let versioner = ModelVersioner::new(config);
    let mut files = FileManager::in_place(&artifacts.project.root);
    let mut changes = ChangeSet::new();

    for name in &names {
        let model = ModelVersioner::current_node(&artifacts.resources, name)
            .with_context(|| format!("Model '{name}' has no current version"))?;
        let bump = versioner
            .add_version(model, prerelease, defined_in, &mut files, &mut changes)
            .with_context(|| format!("Failed to version '{name}'"))?;

        if verbose {
            eprintln!(
                "{} {} v{} (latest v{})",
                "Versioned:".cyan(),
                name,
                bump.version,
                bump.latest_version
            );
        }
    }

    finish("version", &mut files, &changes, selection.len(), run)
}

/// Write staged changes (unless dry run), save and print the report
fn finish(
    command: &str,
    files: &mut FileManager,
    changes: &ChangeSet,
    resources: usize,
    run: &RunArgs,
) -> Result<()> {
    let applied = !run.dry_run;

    if applied {
        let written = files.flush().context("Failed to write changes")?;
        tracing::info!(written, "flushed workspace");
    } else {
        println!("{}", "Dry run, pending files:".yellow().bold());
        for path in files.workspace().pending() {
            println!("  {}", path.display());
        }
    }

    let report = Report::from_changes(command, changes, resources, applied);

    if let Some(output) = &run.output {
        report
            .save_to_file(output)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
        println!("{} {}", "Report written to".cyan(), output.display());
    }

    print_report_summary(&report);
    Ok(())
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", format!("meshcut {}", report.command).bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Selected resources: {}", report.summary.resources);
    println!("  Total changes: {}", report.summary.total);
    println!("  Added:   {}", format!("{}", report.summary.added).green());
    println!("  Updated: {}", format!("{}", report.summary.updated).yellow());
    println!("  Removed: {}", format!("{}", report.summary.removed).red());
    println!();

    if report.changes.is_empty() {
        println!("{}", "✓ Nothing to change".green().bold());
        return;
    }

    println!("{}", "Changes:".bold());
    for change in &report.changes {
        let operation = match change.operation {
            Operation::Add => "ADD".green().bold(),
            Operation::Update => "UPDATE".yellow().bold(),
            Operation::Remove => "REMOVE".red().bold(),
        };
        println!(
            "  [{}] {} {} ({})",
            operation,
            change.entity_type,
            change.identifier,
            change.path.display()
        );
    }
    println!();

    if report.summary.applied {
        println!("{}", "✓ Changes written".green().bold());
    } else {
        println!("{}", "Dry run - no files were written".yellow().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn split_arguments() {
        let cli = Cli::parse_from([
            "meshcut",
            "split",
            "finance",
            "--select",
            "+orders",
            "customers",
            "--exclude",
            "stg_payments",
            "--read-catalog",
            "--dry-run",
        ]);

        match cli.command {
            Commands::Split {
                name,
                selection,
                create_path,
                catalog,
                run,
            } => {
                assert_eq!(name, "finance");
                assert_eq!(selection.select, vec!["+orders", "customers"]);
                assert_eq!(selection.exclude, vec!["stg_payments"]);
                assert!(create_path.is_none());
                assert!(catalog.read_catalog);
                assert!(run.dry_run);
            }
            _ => panic!("expected split"),
        }
    }

    #[test]
    fn selection_is_required() {
        assert!(Cli::try_parse_from(["meshcut", "contract"]).is_err());
    }

    #[test]
    fn global_project_path_after_subcommand() {
        let cli = Cli::try_parse_from([
            "meshcut",
            "version",
            "--select",
            "orders",
            "--prerelease",
            "--project-path",
            "jaffle_shop",
        ])
        .unwrap();

        assert_eq!(cli.project_path, PathBuf::from("jaffle_shop"));
        assert_eq!(cli.command.name(), "version");
    }

    #[test]
    fn config_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "meshcut",
            "--project-path",
            dir.path().to_str().unwrap(),
            "contract",
            "-s",
            "orders",
        ]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.default_yml_file, "_models.yml");
    }
}
