use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "nudge",
    version,
    about = "Session-scoped hint cache for coding agents"
)]
pub struct CliArgs {
    /// Output in JSON format (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// HTTP server port (default: auto-discover from the PID file)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (PRIMARY, or PROXY when one is already running)
    Serve {
        /// Requested HTTP port (auto-increments when taken)
        #[arg(long, default_value_t = nudge_service::DEFAULT_PORT)]
        port: u16,
    },
    /// Check server status
    Status,
    /// Stop the running server
    Stop,
    /// Set or update a hint
    Set {
        component: String,
        key: String,
        value: String,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Priority (1-10)
        #[arg(long)]
        priority: Option<u8>,
        /// Confidence (0.0-1.0)
        #[arg(long)]
        confidence: Option<f64>,
        /// TTL ('session' or an ISO-8601 duration like PT2H)
        #[arg(long)]
        ttl: Option<String>,
        /// Cwd glob pattern
        #[arg(long = "scope-cwd-glob")]
        scope_cwd_glob: Option<String>,
        /// Comma-separated branches
        #[arg(long = "scope-branch")]
        scope_branch: Option<String>,
        /// Comma-separated OS values (linux,darwin,windows)
        #[arg(long = "scope-os")]
        scope_os: Option<String>,
        /// Allow values the secret guard would reject
        #[arg(long)]
        allow_secret: bool,
    },
    /// Get a hint
    Get {
        component: String,
        key: String,
        /// Override the detected working directory
        #[arg(long)]
        cwd: Option<String>,
        /// Override the detected git branch
        #[arg(long)]
        branch: Option<String>,
        /// Override the detected OS
        #[arg(long)]
        os: Option<String>,
    },
    /// Query hints
    Query {
        /// Filter by component
        #[arg(long)]
        component: Option<String>,
        /// Comma-separated tags to filter
        #[arg(long)]
        tags: Option<String>,
        /// Max results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete a hint
    Delete {
        component: String,
        key: String,
    },
    /// Increase frecency counter
    Bump {
        component: String,
        key: String,
        /// Increment amount
        #[arg(long, default_value_t = 1)]
        delta: u64,
    },
    /// List all components, or the keys in one component
    #[command(name = "list-components", visible_alias = "ls")]
    ListComponents {
        /// Component name to list keys for
        component: Option<String>,
    },
    /// Export the store to JSON
    Export {
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Import hints from a JSON file
    Import {
        /// JSON file to import
        file: std::path::PathBuf,
        #[arg(long, default_value = "merge", value_parser = ["merge", "replace"])]
        mode: String,
    },
}
