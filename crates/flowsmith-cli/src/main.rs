//! CLI binary for inspecting and rewriting Flowsmith pipeline documents.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use flowsmith_types::NodeAttrStyle;

#[derive(Parser)]
#[command(name = "flowsmith", version, about = "Pipeline document tools for the Flowsmith editor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Editor configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Node key prefix; overrides the config file and the document header
    #[arg(short, long, global = true)]
    prefix: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Style {
    /// `"[Anchor][JumpBack]Target"`
    Prefix,
    /// `{"name": "Target", "anchor": true}`
    Object,
}

impl From<Style> for NodeAttrStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Prefix => NodeAttrStyle::Prefix,
            Style::Object => NodeAttrStyle::Object,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lint rules over a pipeline file
    Validate {
        /// Path to the pipeline .json/.jsonc file
        pipeline: PathBuf,
    },

    /// Show nodes and links of a pipeline
    Info {
        /// Path to the pipeline .json/.jsonc file
        pipeline: PathBuf,
    },

    /// Rewrite a pipeline in canonical form
    Format {
        pipeline: PathBuf,

        /// How anchor and jump-back references are written
        #[arg(long, value_enum)]
        style: Option<Style>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Move layout metadata into the side config file
    Split {
        pipeline: PathBuf,

        /// Where to write the cleaned pipeline (default: in place)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a side config file back into its pipeline
    Merge {
        pipeline: PathBuf,

        /// Side config file (default: `.<name>.mpe.json` next to the pipeline)
        #[arg(long)]
        side: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List every node and edge on a path between two nodes
    Path {
        pipeline: PathBuf,
        /// Start node label
        from: String,
        /// End node label
        to: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref(), cli.prefix.as_deref())?;

    match cli.command {
        Commands::Validate { pipeline } => {
            let imported = commands::load_graph(&pipeline, &config)?;
            let (lines, has_error) = commands::validate_report(&imported.graph);
            if lines.is_empty() {
                println!("Pipeline is valid");
            }
            for line in &lines {
                println!("{line}");
            }
            if has_error {
                std::process::exit(1);
            }
        }
        Commands::Info { pipeline } => {
            let imported = commands::load_graph(&pipeline, &config)?;
            println!("{}", commands::info_report(&pipeline, &imported));
        }
        Commands::Format {
            pipeline,
            style,
            output,
        } => {
            let imported = commands::load_graph(&pipeline, &config)?;
            let text = commands::format_document(&pipeline, &imported, &config, style.map(Into::into))?;
            emit(text, output.as_deref())?;
        }
        Commands::Split { pipeline, output } => {
            let (written, side) = commands::split_file(&pipeline, output.as_deref())?;
            println!("Pipeline: {}", written.display());
            println!("Side config: {}", side.display());
        }
        Commands::Merge {
            pipeline,
            side,
            output,
        } => {
            let text = commands::merge_files(&pipeline, side.as_deref())?;
            emit(text, output.as_deref())?;
        }
        Commands::Path { pipeline, from, to } => {
            let imported = commands::load_graph(&pipeline, &config)?;
            println!("{}", commands::path_report(&imported.graph, &from, &to)?);
        }
    }

    Ok(())
}

fn emit(text: String, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), "Written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
