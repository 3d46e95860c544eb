//! Clap derive structures for the `miele` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// miele -- command-line client for the Miele cloud
#[derive(Debug, Parser)]
#[command(
    name = "miele",
    version,
    about = "Monitor and control Miele appliances from the command line",
    long_about = "Talks to the Miele cloud API (api.mcs3.miele.com).\n\n\
        Device state is read from GET /devices and the server-sent event\n\
        stream; actions are sent with PUT /devices/{serial}/actions.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "MIELE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL including the version prefix (overrides profile)
    #[arg(long, env = "MIELE_API_URL", global = true)]
    pub api_url: Option<String>,

    /// OAuth access token
    #[arg(long, env = "MIELE_ACCESS_TOKEN", global = true, hide_env = true)]
    pub access_token: Option<String>,

    /// Language for localized values (e.g. en, de)
    #[arg(long, short = 'l', env = "MIELE_LANGUAGE", global = true)]
    pub language: Option<String>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "MIELE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Device fetch timeout in seconds
    #[arg(long, env = "MIELE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect appliances and their capabilities
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Send an action to an appliance
    #[command(alias = "a")]
    Action(ActionArgs),

    /// Follow live device updates until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List appliances on the account
    #[command(alias = "ls")]
    List,

    /// Show the flattened state of one appliance
    Get {
        /// Serial number
        serial: String,
    },

    /// Show which actions an appliance currently accepts
    Actions {
        /// Serial number
        serial: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ACTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ActionArgs {
    #[command(subcommand)]
    pub command: ActionCommand,
}

#[derive(Debug, Subcommand)]
pub enum ActionCommand {
    /// Start, stop or pause a program, or toggle super cooling/freezing
    Process {
        /// Serial number
        serial: String,

        #[arg(value_parser = clap::builder::PossibleValuesParser::new([
            "start",
            "stop",
            "pause",
            "start_superfreezing",
            "stop_superfreezing",
            "start_supercooling",
            "stop_supercooling",
        ]))]
        action: String,
    },

    /// Set the target temperature of a zone
    #[command(alias = "temp")]
    Temperature {
        /// Serial number
        serial: String,

        /// Degrees Celsius, rounded to a whole number
        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Temperature zone (1-based)
        #[arg(long, short = 'z', default_value = "1")]
        zone: u8,
    },

    /// Switch an appliance on or off
    Power {
        /// Serial number
        serial: String,

        state: PowerState,
    },

    /// Send a generic action (camelCase fields, validated locally)
    Generic {
        /// Serial number
        serial: String,

        /// Action as a JSON object, e.g. '{"light": 1}'
        json: String,
    },

    /// Send a JSON object to the actions endpoint unchanged
    Raw {
        /// Serial number
        serial: String,

        /// Request body as a JSON object
        json: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print updates for this serial number
    #[arg(long, short = 's')]
    pub serial: Option<String>,

    /// Rely on the event stream alone (no background polling)
    #[arg(long)]
    pub no_poll: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Store an access token for the active profile in the system keyring
    SetToken {
        /// Read the token from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
