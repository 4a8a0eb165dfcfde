//! Command-line front end: generate test cases for a diff, or extract them
//! from a saved model response.

mod render;

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use commit2test_core::prelude::*;
use tracing::info;

use crate::render::{files_in_diff, markdown_summary, unseen_suffix};

/// Generate structured test cases from branch diffs with a streaming LLM.
#[derive(Parser, Debug)]
#[command(name = "commit2test")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a generation for a diff and print the extracted test cases.
    Generate(GenerateArgs),
    /// Extract requirement and test cases from an existing response text.
    Extract {
        /// Response text file, or `-` for stdin
        input: PathBuf,
        /// Print the result as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    /// Unified diff file, or `-` for stdin
    #[arg(long)]
    diff: PathBuf,
    /// Commit summary line (repeatable)
    #[arg(long = "commit")]
    commits: Vec<String>,
    /// File with one commit summary per line
    #[arg(long)]
    commits_file: Option<PathBuf>,
    /// Changed file path (repeatable); derived from the diff when omitted
    #[arg(long = "file")]
    files: Vec<String>,
    /// Branch name shown in the session events
    #[arg(long, default_value = "HEAD")]
    branch: String,
    /// Provider family: openai, custom or anthropic (overrides COMMIT2TEST_PROVIDER)
    #[arg(long)]
    provider: Option<String>,
    /// Model name (overrides COMMIT2TEST_MODEL)
    #[arg(long)]
    model: Option<String>,
    /// Endpoint URL (overrides COMMIT2TEST_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,
    /// Print the result as JSON instead of markdown
    #[arg(long)]
    json: bool,
    /// Print every session event as a JSON line instead of streaming text
    #[arg(long, conflicts_with = "json")]
    events: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    commit2test_core::init_observability();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => generate(args).await,
        Command::Extract { input, json } => {
            let text = read_input(&input)?;
            let result = commit2test_core::extract(&text);
            print_result(&result, json)
        }
    }
}

async fn generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let overrides: HashMap<&str, String> = [
        ("COMMIT2TEST_PROVIDER", args.provider),
        ("COMMIT2TEST_MODEL", args.model),
        ("COMMIT2TEST_ENDPOINT", args.endpoint),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key, v)))
    .collect();
    let config = GenerationConfig::from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })?;
    let generator = Generator::new(config)?;

    let diff = read_input(&args.diff)?;
    let mut commits = args.commits;
    if let Some(path) = &args.commits_file {
        commits.extend(
            read_input(path)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToOwned::to_owned),
        );
    }
    let files = if args.files.is_empty() {
        files_in_diff(&diff)
    } else {
        args.files
    };
    let context = DiffContext::new(args.branch, diff)
        .files(files)
        .commits(commits);

    let mut stream = generator.start(context)?;
    info!(session_id = %stream.session_id(), "generation started");

    let mut printed = String::new();
    while let Some(event) = stream.next_event().await {
        if args.events {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }
        match &event {
            SessionEvent::StreamChunk { cumulative_text } => {
                eprint!("{}", unseen_suffix(&printed, cumulative_text));
                std::io::stderr().flush()?;
                printed.clone_from(cumulative_text);
            }
            SessionEvent::StreamEnd { .. } if !printed.is_empty() => eprintln!(),
            SessionEvent::Error { message } => eprintln!("\nerror: {message}"),
            _ => {}
        }
    }

    let result = stream.finish().await?;
    if args.events {
        return Ok(());
    }
    print_result(&result, args.json)
}

fn print_result(result: &ExtractionResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", markdown_summary(result));
    }
    Ok(())
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())
    } else {
        std::fs::read_to_string(path)
    }
}
