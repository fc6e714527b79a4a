//! NiceTouch CLI
//!
//! Converts between OTIO timelines and the JSON edit document, and runs the
//! export / clear / import round trip against the NLE.

mod commands;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use nicetouch_core::core::settings::{resolve_project_root, ConfigManager};

use commands::AppContext;

#[derive(Parser)]
#[command(name = "nicetouch-cli")]
#[command(about = "OTIO <-> JSON timeline interchange and NLE round trip")]
#[command(version)]
struct Cli {
    /// Project root (defaults to $NICETOUCH_PROJECT_ROOT, then the working directory)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Config file (defaults to <project-root>/nicetouch.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily-rolling log files here
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an OTIO timeline into the JSON edit document
    ToJson {
        input: PathBuf,

        /// Output JSON path (defaults to the input with a .json extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild an OTIO timeline from a JSON edit document
    ToOtio {
        input: PathBuf,

        /// Output OTIO path (defaults to the input with a .otio extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not synthesize audio tracks for video-only documents
        #[arg(long)]
        no_audio: bool,
    },

    /// Apply a JSON edit document to a reference OTIO timeline
    Patch {
        reference: PathBuf,
        document: PathBuf,

        /// Output OTIO path (defaults to the document with a .otio extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the contents of a JSON edit document
    Describe {
        document: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a pipeline stage
    Pipeline {
        #[command(subcommand)]
        stage: PipelineCommand,
    },
}

#[derive(Subcommand)]
enum PipelineCommand {
    /// Export a timeline from the NLE into the reference directory
    Export {
        /// Timeline name (defaults to the NLE's current timeline)
        #[arg(short, long)]
        timeline: Option<String>,
    },

    /// Empty the edited directory
    Clear,

    /// Rebuild the newest edited JSON and import it into the NLE
    Import {
        /// Name for the new timeline (defaults to the JSON file stem)
        #[arg(short, long)]
        timeline: Option<String>,

        /// Import the referenced media into the media pool as well
        #[arg(long)]
        import_source_clips: bool,
    },

    /// Show the workflow state and staged files
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Copy the reference JSON into the edited directory for hand editing
    CopyRef,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let project_root = resolve_project_root(cli.project_root);
    let manager = match cli.config {
        Some(path) => ConfigManager::new(path),
        None => ConfigManager::discover(&project_root),
    };
    let config = manager
        .try_load()
        .with_context(|| format!("Failed to load {}", manager.config_path().display()))?;

    let log_dir = cli.log_dir.or_else(|| {
        config
            .logging
            .log_dir
            .as_ref()
            .map(|dir| project_root.join(dir))
    });
    logging::init_logging(
        logging::effective_level(&config.logging.level, cli.verbose),
        log_dir.as_deref(),
    );
    tracing::debug!(
        project_root = %project_root.display(),
        config = %manager.config_path().display(),
        "Starting"
    );

    let ctx = AppContext {
        project_root,
        config,
    };

    match cli.command {
        Commands::ToJson { input, output } => commands::to_json(&input, output.as_deref()),
        Commands::ToOtio {
            input,
            output,
            no_audio,
        } => commands::to_otio(&ctx, &input, output.as_deref(), no_audio),
        Commands::Patch {
            reference,
            document,
            output,
        } => commands::patch(&ctx, &reference, &document, output.as_deref()),
        Commands::Describe { document, json } => commands::describe(&document, json),
        Commands::Pipeline { stage } => match stage {
            PipelineCommand::Export { timeline } => {
                commands::pipeline_export(&ctx, timeline.as_deref()).await
            }
            PipelineCommand::Clear => commands::pipeline_clear(&ctx),
            PipelineCommand::Import {
                timeline,
                import_source_clips,
            } => commands::pipeline_import(&ctx, timeline.as_deref(), import_source_clips).await,
            PipelineCommand::Status { json } => commands::pipeline_status(&ctx, json),
            PipelineCommand::CopyRef => commands::pipeline_copy_ref(&ctx),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_pipeline_import() {
        let cli = Cli::try_parse_from([
            "nicetouch-cli",
            "-vv",
            "pipeline",
            "import",
            "--timeline",
            "Edit",
            "--import-source-clips",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Pipeline {
                stage:
                    PipelineCommand::Import {
                        timeline,
                        import_source_clips,
                    },
            } => {
                assert_eq!(timeline.as_deref(), Some("Edit"));
                assert!(import_source_clips);
            }
            _ => panic!("expected pipeline import"),
        }
    }

    #[test]
    fn test_parses_to_otio_flags() {
        let cli = Cli::try_parse_from(["nicetouch-cli", "to-otio", "cut.json", "--no-audio", "-o", "out.otio"])
            .unwrap();
        match cli.command {
            Commands::ToOtio {
                input,
                output,
                no_audio,
            } => {
                assert_eq!(input, PathBuf::from("cut.json"));
                assert_eq!(output, Some(PathBuf::from("out.otio")));
                assert!(no_audio);
            }
            _ => panic!("expected to-otio"),
        }
    }
}
