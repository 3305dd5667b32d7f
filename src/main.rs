use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use packd::Result;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packd")]
#[command(author = "Chris Cheng <chris.cheng@shopee.com>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deployment package versioning & archival", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize version state in the current directory
    Init {
        /// Re-seed at 0.0.0/dev even if state exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show current version, stage and history summary
    Status {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Propose and commit a version increment
    Bump {
        /// Increment kind: major, minor, patch or prerelease
        kind: String,

        /// Explicit target version (still validated)
        #[arg(long)]
        set: Option<String>,

        /// Show the candidate without committing
        #[arg(long)]
        dry_run: bool,
    },

    /// Transition to a development stage
    Stage {
        /// Target stage: dev, alpha, beta, rc, release, stable or hotfix
        target: String,
    },

    /// List the next versions compatible with the current stage
    Suggest {
        /// Restrict to one increment kind
        #[arg(long)]
        kind: Option<String>,
    },

    /// Show committed increment history
    History {
        /// Number of records to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Check or synchronize version tokens across project files
    Sync {
        /// File spec `<path>:<syntax>[:<arg>]` (syntax: kv, toml, regex;
        /// prefix with `!` to mark mandatory). Repeatable.
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Rewrite out-of-sync files (all-or-nothing)
        #[arg(long)]
        apply: bool,
    },

    /// Build a deterministic package archive and store it
    Build {
        /// Source root to collect from
        root: String,

        /// Inclusion override patterns
        #[arg(short, long = "include")]
        include: Vec<String>,

        /// Exclusion patterns (matched against archive-relative paths)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Checksum worker-pool size
        #[arg(short, long, default_value_t = 4)]
        workers: usize,

        /// Overall wall-clock budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output archive path (default `<name>-<version>.tar.gz`)
        #[arg(short, long)]
        output: Option<String>,

        /// Package name recorded in the repository
        #[arg(short, long, default_value = "package")]
        name: String,

        /// Target platform recorded in the repository
        #[arg(short, long)]
        platform: Option<String>,

        /// Repository root (default under the user data dir)
        #[arg(long)]
        repo: Option<String>,

        /// Build only, skip storing into the repository
        #[arg(long)]
        no_store: bool,
    },

    /// Local package repository maintenance
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// List every stored package
    List {
        #[arg(long)]
        repo: Option<String>,
    },

    /// Search stored packages
    Find {
        #[arg(long)]
        repo: Option<String>,

        /// Substring match on the package name
        #[arg(short, long)]
        name: Option<String>,

        /// Exact version or semver requirement (`1.2.3`, `^1.2`)
        #[arg(short, long)]
        version: Option<String>,

        /// Exact platform match
        #[arg(short, long)]
        platform: Option<String>,

        /// Created at or after (RFC 3339)
        #[arg(long)]
        after: Option<String>,

        /// Created at or before (RFC 3339)
        #[arg(long)]
        before: Option<String>,
    },

    /// Remove an entry and its blob
    Remove {
        /// Entry id (`sha256:<hex>`)
        entry_id: String,

        #[arg(long)]
        repo: Option<String>,
    },

    /// Recompute checksums and report index/blob drift
    Verify {
        #[arg(long)]
        repo: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => packd::cli::init::run(force),
        Commands::Status { json } => packd::cli::status::run(json),
        Commands::Bump {
            kind,
            set,
            dry_run,
        } => packd::cli::bump::run(&kind, set.as_deref(), dry_run),
        Commands::Stage { target } => packd::cli::stage::run(&target),
        Commands::Suggest { kind } => packd::cli::suggest::run(kind.as_deref()),
        Commands::History { limit } => packd::cli::history::run(limit),
        Commands::Sync { files, apply } => packd::cli::sync::run(&files, apply),
        Commands::Build {
            root,
            include,
            exclude,
            workers,
            timeout,
            output,
            name,
            platform,
            repo,
            no_store,
        } => packd::cli::build::run(
            &root,
            &include,
            &exclude,
            workers,
            timeout,
            output.as_deref(),
            &name,
            platform.as_deref(),
            repo.as_deref(),
            no_store,
        ),
        Commands::Repo { command } => match command {
            RepoCommands::List { repo } => packd::cli::repo::list(repo.as_deref()),
            RepoCommands::Find {
                repo,
                name,
                version,
                platform,
                after,
                before,
            } => packd::cli::repo::find(
                repo.as_deref(),
                name.as_deref(),
                version.as_deref(),
                platform.as_deref(),
                after.as_deref(),
                before.as_deref(),
            ),
            RepoCommands::Remove { entry_id, repo } => {
                packd::cli::repo::remove(repo.as_deref(), &entry_id)
            }
            RepoCommands::Verify { repo } => packd::cli::repo::verify(repo.as_deref()),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
