use clap::{Parser, Subcommand, ValueEnum};
use faceprint_core::{
    load_pipeline, DetectOutcome, EmbedOutcome, EngineConfig, ModeSelection,
    UsageOutcome, VerifyOutcome,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: faceprint [--model-dir DIR] [--mode auto|model|geometric] <embed|verify|detect> <image path(s)>";

#[derive(Parser)]
#[command(name = "faceprint", about = "Face embedding and verification CLI")]
struct Cli {
    /// Directory containing the ONNX model files
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Extraction strategy: probe the model engine, or force one path
    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Auto,
    Model,
    Geometric,
}

impl From<Mode> for ModeSelection {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => ModeSelection::Auto,
            Mode::Model => ModeSelection::Model,
            Mode::Geometric => ModeSelection::Geometric,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a face embedding from one image
    Embed { image: PathBuf },
    /// Compare the faces in two images
    Verify { first: PathBuf, second: PathBuf },
    /// Report whether an image contains faces, and how many
    Detect { image: PathBuf },
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries exactly one outcome line.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            // Argument errors still produce an outcome line. Only a
            // bare invocation exits non-zero; every other failure
            // reports through the envelope and exits 0.
            emit(&UsageOutcome::new(USAGE));
            return if std::env::args_os().len() <= 1 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = EngineConfig {
        model_dir: cli
            .model_dir
            .unwrap_or_else(faceprint_core::default_model_dir),
        mode: cli.mode.into(),
    };

    let mut pipeline = match load_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            emit(&UsageOutcome::new(err.to_string()));
            return ExitCode::SUCCESS;
        }
    };

    match cli.command {
        Command::Embed { image } => emit(&EmbedOutcome::from_result(pipeline.embed(&image))),
        Command::Verify { first, second } => {
            let mode = pipeline.mode();
            emit(&VerifyOutcome::from_result(
                mode,
                pipeline.verify(&first, &second),
            ));
        }
        Command::Detect { image } => {
            emit(&DetectOutcome::from_result(pipeline.count_faces(&image)));
        }
    }

    ExitCode::SUCCESS
}

fn emit<T: Serialize>(outcome: &T) {
    match serde_json::to_string(outcome) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            tracing::error!(error = %err, "outcome serialization failed");
            println!(r#"{{"success":false,"message":"internal serialization error"}}"#);
        }
    }
}
