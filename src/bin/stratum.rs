//! # stratum CLI
//!
//! Command-line front end for the stratum version-control engine.
//!
//! ## Usage
//! ```bash
//! # Initialize a repository in the current directory
//! stratum init
//!
//! # Snapshot the working directory
//! stratum commit -a "Alice" -m "initial import"
//!
//! # Walk history
//! stratum log
//!
//! # Manage branches
//! stratum branch add feature
//! stratum branch list
//!
//! # Compare two commits
//! stratum diff <from> <to>
//! ```
//!
//! The CLI is a thin mapping layer: every subcommand calls one library
//! operation, prints the outcome and exits 0 on success or 1 on any error.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use stratum::diff::{DiffId, DiffKind, DiffTree};
use stratum::repository::{Repository, DEFAULT_BRANCH, DEFAULT_REPO_DIR};
use stratum::types::ObjectHash;
use stratum::Result;
use tracing_subscriber::EnvFilter;

/// stratum - content-addressed version control
#[derive(Parser)]
#[command(name = "stratum")]
#[command(version)]
#[command(about = "Content-addressed version control: snapshot, branch and diff directory states")]
struct Cli {
    /// Working directory (defaults to current)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Repository directory name inside the working directory
    #[arg(short, long, global = true, default_value = DEFAULT_REPO_DIR)]
    repo_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init {
        /// Name of the initial branch
        #[arg(short, long, default_value = DEFAULT_BRANCH)]
        branch: String,
    },

    /// Delete the repository directory
    Delete,

    /// Manage branches
    #[command(subcommand)]
    Branch(BranchCommands),

    /// Snapshot the working directory as a new commit
    #[command(alias = "ci")]
    Commit {
        /// Commit author
        #[arg(short, long)]
        author: String,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show commit history
    Log {
        /// Commit hash to start from (defaults to HEAD)
        start: Option<String>,

        /// Emit history as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save one file's content into the object store
    Save {
        /// File to save
        file: PathBuf,
    },

    /// Compare the trees of two commits
    Diff {
        /// Source commit hash
        from: String,

        /// Target commit hash
        to: String,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// Create a branch
    Add { name: String },
    /// Delete a branch
    Delete { name: String },
    /// List all branches
    List,
    /// Check whether a branch exists
    Exists { name: String },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let working_dir = match cli.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let repo = Repository::new(working_dir, cli.repo_dir);

    match cli.command {
        Commands::Init { branch } => {
            repo.init(&branch)?;
            println!(
                "Initialized empty repository in {}",
                repo.repo_path().display().to_string().cyan()
            );
        }
        Commands::Delete => {
            repo.delete_repo()?;
            println!("Deleted repository at {}", repo.repo_path().display());
        }
        Commands::Branch(cmd) => run_branch(&repo, cmd)?,
        Commands::Commit { author, message } => {
            let hash = repo.create_commit(&author, &message)?;
            println!("{} {}", "committed".green(), hash);
        }
        Commands::Log { start, json } => run_log(&repo, start, json)?,
        Commands::Save { file } => {
            let blob = repo.save_file_content(&file)?;
            println!("{}", blob.hash);
        }
        Commands::Diff { from, to } => {
            let from: ObjectHash = from.parse()?;
            let to: ObjectHash = to.parse()?;
            let diff = repo.diff_commits(&from, &to)?;
            if diff.is_empty() {
                println!("no differences");
            } else {
                for &root in diff.roots() {
                    print_diff_node(&diff, root, 0);
                }
                let summary = diff.summary();
                println!(
                    "\n{} added, {} removed, {} modified, {} moved",
                    summary.added, summary.removed, summary.modified, summary.moved
                );
            }
        }
    }

    Ok(())
}

fn run_branch(repo: &Repository, cmd: BranchCommands) -> Result<()> {
    match cmd {
        BranchCommands::Add { name } => {
            repo.add_branch(&name)?;
            println!("{} branch '{}'", "created".green(), name);
        }
        BranchCommands::Delete { name } => {
            repo.delete_branch(&name)?;
            println!("{} branch '{}'", "deleted".yellow(), name);
        }
        BranchCommands::List => {
            for name in repo.list_branches()? {
                println!("{name}");
            }
        }
        BranchCommands::Exists { name } => {
            if repo.branch_exists(&name)? {
                println!("branch '{name}' exists");
            } else {
                println!("branch '{name}' does not exist");
            }
        }
    }
    Ok(())
}

fn run_log(repo: &Repository, start: Option<String>, json: bool) -> Result<()> {
    let start = start.map(|s| s.parse::<ObjectHash>()).transpose()?;

    if json {
        let entries: Vec<_> = repo
            .commit_history(start)?
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|(hash, commit)| {
                serde_json::json!({
                    "hash": hash,
                    "tree": commit.tree_hash,
                    "author": commit.author,
                    "message": commit.message,
                    "timestamp": commit.timestamp,
                    "parent": commit.parent,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in repo.commit_history(start)? {
        let (hash, commit) = entry?;
        let when = chrono::DateTime::from_timestamp(commit.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| commit.timestamp.to_string());
        println!("{} {}", "commit".yellow(), hash);
        println!("Author: {}", commit.author);
        println!("Date:   {when}");
        println!("\n    {}\n", commit.message);
    }
    Ok(())
}

fn print_diff_node(diff: &DiffTree, id: DiffId, depth: usize) {
    let node = diff.node(id);
    let indent = "  ".repeat(depth);
    let name = &node.record.name;
    let line = match node.kind {
        DiffKind::Added => format!("{} {}", "added".green(), name),
        DiffKind::Removed => format!("{} {}", "removed".red(), name),
        DiffKind::Modified => format!("{} {}", "modified".yellow(), name),
        DiffKind::MovedFrom(to) => format!(
            "{} {} -> {}",
            "moved".cyan(),
            name,
            node_path(diff, to).join("/")
        ),
        DiffKind::MovedTo(from) => format!(
            "{} {} <- {}",
            "moved".cyan(),
            name,
            node_path(diff, from).join("/")
        ),
    };
    println!("{indent}{line}");
    for &child in &node.children {
        print_diff_node(diff, child, depth + 1);
    }
}

fn node_path(diff: &DiffTree, id: DiffId) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = Some(id);
    while let Some(node_id) = current {
        let node = diff.node(node_id);
        segments.push(node.record.name.clone());
        current = node.parent;
    }
    segments.reverse();
    segments
}
