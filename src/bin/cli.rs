//! conflictdb CLI
//!
//! Inspect and maintain the conflicts stored under a base directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use conflictdb::{Config, Conflict, ConflictsDatabase, ConnectionManager, ObjectId, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// conflictdb CLI
#[derive(Parser, Debug)]
#[command(name = "conflictdb-cli")]
#[command(about = "Inspect and edit stored merge conflicts")]
#[command(version)]
struct Args {
    /// Base directory holding the namespace directories
    #[arg(short, long, default_value = "./conflictdb_data")]
    base_dir: PathBuf,

    /// Namespace (transaction id); the default namespace when omitted
    #[arg(short, long)]
    namespace: Option<String>,

    /// MemTable size limit in KB before flush
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List conflicts at and below a path
    List {
        /// Tree path; every conflict when omitted
        prefix: Option<String>,
    },

    /// Count conflicts at and below a path
    Count {
        prefix: Option<String>,
    },

    /// Show the conflict at a path
    Show {
        path: String,
    },

    /// Record a conflict
    Add {
        path: String,

        /// Ancestor object id (40 hex chars); null when omitted
        #[arg(long)]
        ancestor: Option<ObjectId>,

        #[arg(long)]
        ours: Option<ObjectId>,

        #[arg(long)]
        theirs: Option<ObjectId>,
    },

    /// Remove the conflicts at the given paths
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove a path's conflict and all conflicts below it
    RmPrefix {
        prefix: String,
    },

    /// Drop the whole namespace
    Clear,

    /// Print which of the given paths have a conflict
    Find {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conflictdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("conflictdb CLI v{}", conflictdb::VERSION);
    tracing::debug!("Base directory: {}", args.base_dir.display());

    let result = run(&args);
    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    std::fs::create_dir_all(&args.base_dir)?;

    let config = Config::builder()
        .memtable_size_limit(args.memtable_kb * 1024)
        .build();
    let manager = Arc::new(ConnectionManager::new(config));
    let db = ConflictsDatabase::new(&args.base_dir, Arc::clone(&manager))?;
    let ns = args.namespace.as_deref();

    match &args.command {
        Commands::List { prefix } => {
            for conflict in db.get_by_prefix(ns, prefix.as_deref()) {
                print_conflict(&conflict?);
            }
        }
        Commands::Count { prefix } => {
            println!("{}", db.get_count_by_prefix(ns, prefix.as_deref())?);
        }
        Commands::Show { path } => match db.get_conflict(ns, path)? {
            Some(conflict) => print_conflict(&conflict),
            None => println!("(no conflict at {})", path),
        },
        Commands::Add {
            path,
            ancestor,
            ours,
            theirs,
        } => {
            let conflict = Conflict::new(
                path.as_str(),
                ancestor.unwrap_or_default(),
                ours.unwrap_or_default(),
                theirs.unwrap_or_default(),
            );
            db.add_conflict(ns, &conflict)?;
            println!("OK");
        }
        Commands::Rm { paths } => {
            db.remove_conflicts(ns, paths)?;
            println!("OK");
        }
        Commands::RmPrefix { prefix } => {
            db.remove_by_prefix(ns, Some(prefix.as_str()))?;
            println!("OK");
        }
        Commands::Clear => {
            db.remove_namespace(ns)?;
            println!("OK");
        }
        Commands::Find { paths } => {
            let found = db.find_conflicts(ns, paths)?;
            for path in paths.iter().filter(|path| found.contains(*path)) {
                println!("{}", path);
            }
        }
    }

    db.close();
    manager.close_all();
    Ok(())
}

fn print_conflict(conflict: &Conflict) {
    println!(
        "{}\n  ancestor {}\n  ours     {}\n  theirs   {}",
        conflict.path, conflict.ancestor, conflict.ours, conflict.theirs
    );
}
