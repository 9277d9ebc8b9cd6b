//! CLI command definitions for crowd-scheduler.
//!
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod export;

use crate::sched::SchedulingPolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use export::ExportArgs;

/// Scheduling policy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Default,
    BreadthFirst,
    DepthFirst,
    Random,
    Incremental,
}

impl From<PolicyArg> for SchedulingPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Default => SchedulingPolicy::Default,
            PolicyArg::BreadthFirst => SchedulingPolicy::BreadthFirst,
            PolicyArg::DepthFirst => SchedulingPolicy::DepthFirst,
            PolicyArg::Random => SchedulingPolicy::Random,
            PolicyArg::Incremental => SchedulingPolicy::Incremental,
        }
    }
}

/// Crowdsourcing task scheduler and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API (default if no subcommand given)
    Serve(ServeArgs),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Ask the scheduler for the next task
    NewTask(NewTaskArgs),

    /// Record an answer
    Answer(AnswerArgs),

    /// Show project statistics
    Stats {
        project: i64,
    },

    /// Show how many tasks a requester has answered
    Progress {
        project: i64,
        #[command(flatten)]
        requester: RequesterArgs,
    },

    /// Export a project to JSON
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        short_name: String,

        /// Display name (defaults to the short name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum)]
        sched: Option<PolicyArg>,

        /// Refuse requesters without a user id
        #[arg(long)]
        no_anonymous: bool,
    },

    /// List projects
    List,

    /// Change a project's scheduling policy
    SetSched {
        project: i64,
        #[arg(value_enum)]
        sched: PolicyArg,
    },

    /// Allow or refuse anonymous contributors
    SetAnonymous {
        project: i64,
        #[arg(action = clap::ArgAction::Set)]
        allow: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a task to a project
    Add {
        project: i64,

        /// Answers required (defaults to scheduler.default_n_answers)
        #[arg(short, long)]
        n_answers: Option<i64>,

        #[arg(short, long)]
        priority: Option<f64>,

        /// Task payload as a JSON object
        #[arg(short, long)]
        info: Option<String>,
    },

    /// List a project's tasks
    List {
        project: i64,

        /// Only tasks in this state (ongoing or completed)
        #[arg(long)]
        state: Option<String>,
    },

    /// Set the redundancy of every ongoing task in a project
    Redundancy {
        project: i64,
        n_answers: i64,
    },
}

/// Requester identity flags.
#[derive(Args, Debug, Default, Clone)]
pub struct RequesterArgs {
    #[arg(long)]
    pub user_id: Option<i64>,

    #[arg(long)]
    pub user_ip: Option<String>,
}

#[derive(Args, Debug)]
pub struct NewTaskArgs {
    pub project: i64,

    #[command(flatten)]
    pub requester: RequesterArgs,

    /// Skip this many eligible tasks (prefetching)
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct AnswerArgs {
    pub project: i64,
    pub task: i64,

    #[command(flatten)]
    pub requester: RequesterArgs,

    /// Answer payload as JSON (plain text is stored as a JSON string)
    #[arg(long)]
    pub info: Option<String>,
}

/// Parse a JSON argument, treating text that is not JSON as a string.
pub fn parse_json_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
