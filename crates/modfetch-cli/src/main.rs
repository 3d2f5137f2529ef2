//! modfetch - content-addressed module fetcher
//!
//! Usage:
//!   modfetch clone <source>          # Fetch a repository through the CAS engine
//!   modfetch ls-remote <url> [ref]   # Show remote refs
//!   modfetch ls-tree <url> [ref]     # Show the tree of a remote ref
//!   modfetch repo <source>           # Open a catalog repository
//!   modfetch hash <dir>              # Content hash of a directory

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modfetch_core::cas::{CLONE_COMPLETE_MARKER, Cas, CloneReport};
use modfetch_core::catalog::Repo;
use modfetch_core::config::{self, FetchConfig};
use modfetch_core::fs::hash_tree;
use modfetch_core::git::{GitClient, GitRef, Tree, get_repo_name, is_object_id};

#[derive(Parser)]
#[command(name = "modfetch")]
#[command(about = "Content-addressed git module fetcher", long_about = None)]
struct Cli {
    /// Path to modfetch.toml (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a repository into a directory, deduplicating blobs
    Clone {
        /// Remote URL or local directory
        source: String,

        /// Target directory (defaults to the repository name)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Content store root (overrides config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Branch, tag or commit (defaults to HEAD)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// History depth for branches and tags; 0 for full history
        #[arg(long)]
        depth: Option<u32>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List remote references
    LsRemote {
        url: String,

        /// Ref pattern
        #[arg(default_value = "HEAD")]
        pattern: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List the tree of a remote ref without checking it out
    LsTree {
        url: String,

        #[arg(default_value = "HEAD")]
        reference: String,

        /// Limit to a path inside the repository
        #[arg(default_value = ".")]
        path: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Open a catalog repository and show its remote and branch
    Repo {
        /// Local path, git URL, or cas://<url>
        source: String,

        /// Parent directory for checkouts
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Allow cas:// sources
        #[arg(long)]
        cas: bool,

        /// Module directory to render a browse URL for
        #[arg(long)]
        module: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the content hash of a directory
    Hash {
        dir: PathBuf,

        /// Include `.git` and the completion marker
        #[arg(long)]
        all: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modfetch=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Clone {
            source,
            dir,
            store,
            reference,
            depth,
            format,
        } => run_clone(&config, source, dir, store, reference, depth, format),
        Commands::LsRemote {
            url,
            pattern,
            format,
        } => run_ls_remote(&config, &url, &pattern, format),
        Commands::LsTree {
            url,
            reference,
            path,
            format,
        } => run_ls_tree(&config, &url, &reference, &path, format),
        Commands::Repo {
            source,
            temp_dir,
            cas,
            module,
            format,
        } => run_repo(&config, &source, temp_dir, cas, module.as_deref(), format),
        Commands::Hash { dir, all } => run_hash(&dir, all),
    }
}

fn run_clone(
    config: &FetchConfig,
    source: String,
    dir: Option<PathBuf>,
    store: Option<PathBuf>,
    reference: Option<String>,
    depth: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(store) = store {
        config.store_path = Some(store);
    }
    if let Some(depth) = depth {
        config.depth = depth;
    }

    let runner = config.runner();
    runner.ensure_git_version()?;

    let target = dir.unwrap_or_else(|| {
        let name = get_repo_name(&source);
        PathBuf::from(if name.is_empty() { "repo".to_string() } else { name })
    });
    let mut options = config.clone_options(source, target)?;
    if let Some(reference) = reference {
        options = options.with_reference(reference);
    }

    let report = Cas::with_client(runner, options).clone()?;
    print_clone_report(&report, format)
}

fn print_clone_report(report: &CloneReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Path:    {}", report.path.display());
            println!("Origin:  {:?}", report.origin);
            println!("Commit:  {}", report.commit.as_deref().unwrap_or("-"));
            println!(
                "Blobs:   {} fetched, {} reused",
                report.blobs_fetched, report.blobs_reused
            );
            for submodule in &report.submodules {
                println!("  ⚠ submodule {} @ {} not fetched", submodule.path, submodule.hash);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

fn run_ls_remote(
    config: &FetchConfig,
    url: &str,
    pattern: &str,
    format: OutputFormat,
) -> Result<()> {
    let refs = config.runner().ls_remote(url, pattern)?;
    print_refs(&refs, format)
}

fn print_refs(refs: &[GitRef], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for r in refs {
                println!("{}\t{}", r.hash, r.name);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(refs)?),
    }
    Ok(())
}

fn run_ls_tree(
    config: &FetchConfig,
    url: &str,
    reference: &str,
    path: &str,
    format: OutputFormat,
) -> Result<()> {
    let runner = config.runner();
    let scratch = runner
        .create_temp_dir()
        .context("Failed to create temp dir")?;
    let repo = runner.with_work_dir(scratch.path());

    // Object ids need full history and cannot be passed to --branch.
    let pinned = is_object_id(reference);
    let branch = (reference != "HEAD" && !pinned).then_some(reference);
    repo.clone_repo(url, !pinned && config.depth > 0, config.depth, branch)?;
    let tree = repo.ls_tree(if pinned { reference } else { "HEAD" }, path)?;
    tracing::debug!(entries = tree.len(), reference, "listed tree");
    print_tree(&tree, format)
}

fn print_tree(tree: &Tree, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for entry in tree.entries() {
                println!(
                    "{} {:<6} {}\t{}",
                    entry.mode,
                    entry.kind.as_str(),
                    entry.hash,
                    entry.path
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(tree.entries())?),
    }
    Ok(())
}

fn run_repo(
    config: &FetchConfig,
    source: &str,
    temp_dir: Option<PathBuf>,
    allow_cas: bool,
    module: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let temp_dir = temp_dir.unwrap_or_else(|| std::env::temp_dir().join("modfetch-catalog"));
    let repo = Repo::new(source, &temp_dir, allow_cas, config)?;
    let module_url = module.map(|m| repo.module_url(m)).transpose()?;

    match format {
        OutputFormat::Table => {
            println!("Path:    {}", repo.path().display());
            println!("Remote:  {}", repo.remote_url().unwrap_or("-"));
            println!("Branch:  {}", repo.branch_name());
            if let Some(url) = &module_url {
                println!("Module:  {}", url);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": repo.path(),
                "remote_url": repo.remote_url(),
                "branch": repo.branch_name(),
                "module_url": module_url,
                "report": repo.report(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_hash(dir: &Path, all: bool) -> Result<()> {
    let skip: &[&str] = if all {
        &[]
    } else {
        &[".git", CLONE_COMPLETE_MARKER]
    };
    let hash = hash_tree(dir, skip)?;
    println!("{}  {}", hash, dir.display());
    Ok(())
}
