use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fragment_grader::commands::{
    check_command, grade_command, history_command, list_languages_command, merge_command, CheckArgs,
    GradeArgs,
};
use fragment_grader::init_tracing;

/// Merge, build, check and run fragment-based exercise submissions.
///
/// This CLI is a thin wrapper around `grader-core`; all grading logic lives in
/// the library.
#[derive(Parser, Debug)]
#[command(name = "fragment-grader", version, about = "Grade fragment-based programming exercises", long_about = None)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a submission into its exercise, then compile, check, link and run it.
    ///
    /// Exits non-zero when any executed phase fails or times out.
    Grade {
        /// Exercise document (JSON or YAML).
        #[arg(long)]
        exercise: PathBuf,

        /// Solution document (JSON or YAML).
        #[arg(long)]
        solution: PathBuf,

        /// Grader config file (limits, preprocessor, history DB).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Working directory to build in. Defaults to a fresh temp directory.
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Keep merged sources, objects and logs after the run.
        #[arg(long, default_value_t = false)]
        keep_artifacts: bool,

        /// Record the run in this SQLite history database.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Emit the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Merge a submission without building it and show the fragment layout.
    Merge {
        #[arg(long)]
        exercise: PathBuf,

        #[arg(long)]
        solution: PathBuf,

        /// Write merged files and `sourcemap.json` into this directory.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List top-level calls of every function in C source files.
    ///
    /// Exits non-zero on parse errors or forbidden calls.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Callee that must not appear (repeatable).
        #[arg(long = "forbid")]
        forbidden: Vec<String>,

        /// Preprocess with this program (e.g. `gcc`) against stub headers first.
        #[arg(long)]
        preprocessor: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List supported exercise languages.
    Languages {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show recorded grading runs.
    History {
        /// History database file.
        #[arg(long)]
        db: PathBuf,

        /// Only runs of this exercise.
        #[arg(long)]
        exercise: Option<String>,

        /// Print the stored report of this run instead of the list.
        #[arg(long)]
        run: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ok = match cli.command {
        Command::Grade { exercise, solution, config, workdir, keep_artifacts, history, json } => {
            grade_command(&GradeArgs { exercise, solution, config, workdir, keep_artifacts, history, json })?
        }
        Command::Merge { exercise, solution, out, json } => {
            merge_command(&exercise, &solution, out.as_deref(), json)?;
            true
        }
        Command::Check { files, forbidden, preprocessor, json } => {
            check_command(&CheckArgs { files, forbidden, preprocessor, json })?
        }
        Command::Languages { json } => {
            list_languages_command(json)?;
            true
        }
        Command::History { db, exercise, run, json } => {
            history_command(&db, exercise.as_deref(), run.as_deref(), json)?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
