use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hostkeeper::cli::{
    handle_artifact_command, handle_backup_command, handle_template_command, ArtifactCommands,
    BackupCommands, TemplateCommands,
};
use hostkeeper::config::{HostPaths, Settings};
use hostkeeper::models::Category;
use hostkeeper::services::CommandController;
use hostkeeper::storage::ArtifactStore;
use hostkeeper::template::TemplateLibrary;

#[derive(Parser)]
#[command(
    name = "hostkeeper",
    version,
    about = "Configuration lifecycle and backup/restore for single-host services",
    long_about = "hostkeeper renders service configuration from templates, validates \
                  and activates it against the running service with rollback on \
                  failure, and takes point-in-time backups of configuration and \
                  auxiliary state that can be restored in full, merge or selective mode."
)]
struct Cli {
    /// Log level filter (overrides RUST_LOG)
    #[arg(long, global = true, env = "HOSTKEEPER_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Template blueprint commands
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Artifact lifecycle commands
    #[command(subcommand)]
    Artifact(ArtifactCommands),

    /// Backup and restore commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Create the home directory and default settings
    Init,

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    // Initialize paths and settings
    let paths = HostPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Template(cmd)) => {
            let library = TemplateLibrary::load(&settings.templates_dir(&paths))?;
            handle_template_command(&library, cmd)?;
        }
        Some(Commands::Artifact(cmd)) => {
            let library = TemplateLibrary::load(&settings.templates_dir(&paths))?;
            let controller = CommandController::new(&settings);
            let store = ArtifactStore::new(paths, settings)?;
            handle_artifact_command(&store, &controller, &library, cmd)?;
        }
        Some(Commands::Backup(cmd)) => {
            let controller = CommandController::new(&settings);
            let store = ArtifactStore::new(paths, settings)?;
            handle_backup_command(&store, &controller, cmd)?;
        }
        Some(Commands::Audit { limit }) => {
            let store = ArtifactStore::new(paths, settings)?;
            let entries = store.audit().read_recent(limit)?;
            if entries.is_empty() {
                println!("No audit entries yet.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
        Some(Commands::Init) => {
            println!("Initializing hostkeeper at: {}", paths.base_dir().display());
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Default categories:");
            for name in settings.categories.keys() {
                let layout = settings.layout(&paths, &Category::parse(name)?);
                println!("  - {} ({})", name, layout.available_dir.display());
            }
            println!();
            println!(
                "Edit {} to point categories at your services.",
                paths.settings_file().display()
            );
        }
        Some(Commands::Config) => {
            println!("hostkeeper Configuration");
            println!("========================");
            println!("Home directory:   {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Templates:        {}", settings.templates_dir(&paths).display());
            println!("Audit log:        {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!(
                "  Retention: {} regular, {} pre-restore per category",
                settings.backup_retention.max_per_target,
                settings.backup_retention.max_safety_backups
            );
            println!("  Activation marker: {:?}", settings.activation_marker);
            println!(
                "  Categories: {}",
                settings
                    .categories
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if !paths.is_initialized() {
                println!();
                println!("Not initialized yet; run 'hostkeeper init'.");
            }
        }
        None => {
            println!("hostkeeper - configuration lifecycle and backup/restore");
            println!();
            println!("Run 'hostkeeper --help' for usage information.");
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    let filter = if let Some(level) = &cli.log_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
