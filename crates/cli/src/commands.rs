use cake_protocol::InstanceId;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write starter config.yaml and settings.toml into the base directory
    Init {
        /// Overwrite existing starter files
        #[arg(long)]
        force: bool,
    },

    /// Start services
    Start {
        #[arg(value_name = "TAG", required = true)]
        tags: Vec<String>,
    },

    /// Stop services
    Stop {
        #[arg(value_name = "TAG", required = true)]
        tags: Vec<String>,
    },

    /// Stop, then start services
    Restart {
        #[arg(value_name = "TAG", required = true)]
        tags: Vec<String>,
    },

    /// Restart running services whose definition changed since they started
    Update {
        /// Services to check (all defined services if none given)
        #[arg(value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Show service status
    Status {
        /// Services to show (all defined services if none given)
        #[arg(value_name = "TAG")]
        tags: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List every recorded instance
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a command as an untagged instance
    Run {
        /// Working directory, relative to the current one (a fresh
        /// per-instance directory if omitted)
        #[arg(long, value_name = "DIR")]
        dir: Option<String>,

        /// A shell command line, or a program and its arguments
        #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Stop a single instance by id
    StopInstance {
        #[arg(value_name = "ID")]
        id: InstanceId,
    },
}
