mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Context, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use vdbkit_core::config::expand_tilde;
use vdbkit_core::{install_signal_handler, Config};

#[derive(Debug, Parser)]
#[command(
    name = "vdbkit",
    version,
    about = "Inspect, edit and synchronize VDB archives"
)]
struct Cli {
    /// Configuration file (default: ~/.config/vdbkit/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the private per-archive working directories.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Workspace directory that supplies model and file sources.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show an archive's properties and entries.
    Inspect {
        /// Path to the .vdb archive.
        vdb: PathBuf,
    },
    /// Check every model in the archive against the workspace.
    Validate {
        vdb: PathBuf,
        /// Re-point models that moved inside the workspace and save.
        #[arg(long, default_value_t = false)]
        fix: bool,
    },
    /// Add a file entry and synchronize it from the workspace.
    AddFile {
        vdb: PathBuf,
        /// Archive-relative path, also the workspace-relative source.
        path: String,
    },
    /// Add a model entry and synchronize it from the workspace.
    AddModel { vdb: PathBuf, path: String },
    /// Remove a file or model entry, import, translator or data role by name.
    Remove { vdb: PathBuf, name: String },
    /// Refresh every out-of-date entry from the workspace.
    Sync { vdb: PathBuf },
    /// Set the archive description; an empty string clears it.
    SetDescription { vdb: PathBuf, text: String },
    /// Set the query timeout in seconds; 0 clears it.
    SetTimeout { vdb: PathBuf, seconds: u64 },
    /// Declare the imported archives a model requires.
    Import {
        vdb: PathBuf,
        model: String,
        /// Imported archive names; none clears the model's imports.
        names: Vec<String>,
    },
    /// Add a translator override, or set properties on an existing one.
    Translator {
        vdb: PathBuf,
        name: String,
        /// Translator type, e.g. "oracle".
        #[arg(value_name = "TYPE")]
        translator_type: String,
        /// Properties as key=value; a bare key unsets it.
        properties: Vec<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VDBKIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        command => match load_context(cli.config, cli.state_dir, cli.workspace, cli.json) {
            Ok(ctx) => dispatch(&ctx, command),
            Err(msg) => Err(msg),
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("store error:")
                || msg.starts_with("archive lock:")
                || msg.starts_with("I/O error:")
            {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn load_context(
    config: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    workspace: Option<PathBuf>,
    json: bool,
) -> Result<Context, String> {
    let mut config = Config::load(config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(dir) = state_dir {
        config.state_dir = expand_tilde(&dir);
    }
    if let Some(root) = workspace {
        config.workspace_root = expand_tilde(&root);
    }
    Ok(Context::new(&config, json))
}

fn dispatch(ctx: &Context, command: Commands) -> Result<u8, String> {
    match command {
        Commands::Inspect { vdb } => commands::inspect::run(ctx, &vdb),
        Commands::Validate { vdb, fix } => commands::validate::run(ctx, &vdb, fix),
        Commands::AddFile { vdb, path } => commands::add::run(ctx, &vdb, &path, false),
        Commands::AddModel { vdb, path } => commands::add::run(ctx, &vdb, &path, true),
        Commands::Remove { vdb, name } => commands::remove::run(ctx, &vdb, &name),
        Commands::Sync { vdb } => commands::sync::run(ctx, &vdb),
        Commands::SetDescription { vdb, text } => commands::set::description(ctx, &vdb, &text),
        Commands::SetTimeout { vdb, seconds } => commands::set::timeout(ctx, &vdb, seconds),
        Commands::Import { vdb, model, names } => commands::import::run(ctx, &vdb, &model, &names),
        Commands::Translator {
            vdb,
            name,
            translator_type,
            properties,
        } => commands::translator::run(ctx, &vdb, &name, &translator_type, &properties),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}
