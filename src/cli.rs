use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use scmkit::{ContainerSelection, DesiredState, ResourceKey};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scmctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Idempotent reconciliation of cloud network-policy objects", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Reuse and persist the bearer token across runs
    #[arg(long, global = true)]
    pub cache_token: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge one resource toward its desired state
    Apply(ApplyArgs),

    /// Look up one resource without changing anything
    Show(TargetArgs),

    /// List the supported resource types
    Types,

    /// Exchange credentials and report token expiry
    Auth(AuthArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Connection
// ============================================================================

/// Credential and endpoint overrides; each beats the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Config file (default: <config dir>/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Service account client id
    #[arg(long, env = "SCM_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Service account client secret
    #[arg(long, env = "SCM_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// Tenant service group id
    #[arg(long, env = "SCM_TSG_ID", global = true)]
    pub tsg_id: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, env = "SCM_TOKEN_URL", global = true)]
    pub token_url: Option<String>,

    /// Resource API base URL
    #[arg(long, env = "SCM_API_BASE", global = true)]
    pub api_base: Option<String>,
}

// ============================================================================
// Target
// ============================================================================

/// Resource type, container and key of one resource.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Resource type (see `scmctl types`)
    pub resource_type: String,

    #[command(flatten)]
    pub container: ContainerArgs,

    #[command(flatten)]
    pub key: KeyArgs,
}

/// Container flags; exactly one must be given.
#[derive(Args, Debug, Clone, Default)]
pub struct ContainerArgs {
    /// Folder name
    #[arg(long)]
    pub folder: Option<String>,

    /// Snippet name
    #[arg(long)]
    pub snippet: Option<String>,

    /// Device name
    #[arg(long)]
    pub device: Option<String>,
}

impl ContainerArgs {
    /// Raw selection; validated by the reconciler before any request.
    pub fn selection(&self) -> ContainerSelection {
        ContainerSelection {
            folder: self.folder.clone(),
            snippet: self.snippet.clone(),
            device: self.device.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct KeyArgs {
    /// Resource name, unique within its container
    #[arg(long)]
    pub name: Option<String>,

    /// Server-assigned resource id
    #[arg(long)]
    pub id: Option<String>,
}

impl KeyArgs {
    pub fn key(&self) -> ResourceKey {
        match (&self.id, &self.name) {
            (Some(id), _) => ResourceKey::id(id.as_str()),
            (None, Some(name)) => ResourceKey::name(name.as_str()),
            (None, None) => ResourceKey::name(""),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Remove the cached token instead of exchanging credentials
    #[arg(long)]
    pub forget: bool,
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Desired fields as a JSON object
    #[arg(long, conflicts_with = "spec_file")]
    pub spec: Option<String>,

    /// Read desired fields from a JSON file
    #[arg(long, value_name = "PATH")]
    pub spec_file: Option<String>,

    /// Whether the resource should exist
    #[arg(long, value_enum, default_value_t = StateArg::Present)]
    pub state: StateArg,

    /// Report what would change without changing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print a line diff of the resource
    #[arg(long)]
    pub diff: bool,

    /// Delete without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Retry transient failures up to N times
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    Present,
    Absent,
}

impl From<StateArg> for DesiredState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Present => Self::Present,
            StateArg::Absent => Self::Absent,
        }
    }
}
