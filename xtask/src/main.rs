use std::fs;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the cloud topology workspace",
    long_about = "A unified CLI for synthesizing the image pipeline deployment\n\
                  artifact and running CI checks in the topology workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the image pipeline deployment artifact
    Synth {
        /// Output file path
        #[arg(long, default_value = "deployment_artifact.json")]
        output: String,
    },
    /// Run Criterion benchmarks
    Bench,
    /// Run CI checks (fmt, clippy, tests, examples, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and run the synth example
    Examples,
    /// Run benchmarks
    Bench,
    /// Run check + examples + bench
    All,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { output } => synth(&output),
        Commands::Bench => run_benchmarks(),
        Commands::Ci { job } => match job {
            CiJob::Check => ci_check(),
            CiJob::Examples => ci_examples(),
            CiJob::Bench => run_benchmarks(),
            CiJob::All => {
                ci_check();
                ci_examples();
                run_benchmarks();
            }
        },
    }
}

// ── tasks ──────────────────────────────────────────────────────────

fn synth(output: &str) {
    step("Synthesize deployment artifact");
    run_cargo(&[
        "run",
        "-p",
        "topo_image_pipeline",
        "--example",
        "synth_pipeline",
        "--",
        output,
    ]);
}

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Run clippy");
    run_cargo(&[
        "clippy",
        "--workspace",
        "--all-targets",
        "--",
        "-D",
        "warnings",
    ]);

    step("Run tests");
    run_cargo(&["test", "--workspace"]);
}

fn ci_examples() {
    step("Run synth example");
    let scratch_dir = Path::new("target/ci");
    fs::create_dir_all(scratch_dir).expect("failed to create ci scratch directory");
    let artifact_path = scratch_dir.join("deployment_artifact.json");
    run_cargo(&[
        "run",
        "-p",
        "topo_image_pipeline",
        "--example",
        "synth_pipeline",
        "--",
        artifact_path.to_str().expect("scratch path is valid utf-8"),
    ]);
}

fn run_benchmarks() {
    step("Run benchmarks");
    run_cargo(&["bench", "-p", "topo_core"]);
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}
