// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sshpool")]
#[command(about = "Keyed pool of SSH sessions: commands, shells and local port forwards")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: discover sshpool.yml in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve JSON-lines requests on stdin, replies and shell events on stdout
    Serve,

    /// Run one command on a host and print its output
    Exec {
        /// Host profile name or [user@]host[:port]
        host: String,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,

        /// Password to use instead of the profile's credential
        #[arg(long, env = "SSHPOOL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forward a local port to a remote host:port until interrupted
    Forward {
        /// Host profile name or [user@]host[:port]
        host: String,

        /// Local port to listen on (0 picks a free port)
        lport: u16,

        /// Destination host as seen from the SSH server
        rhost: String,

        /// Destination port
        rport: u16,

        /// Password to use instead of the profile's credential
        #[arg(long, env = "SSHPOOL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Initialize a new sshpool.yml configuration file
    Init {
        /// Overwrite an existing sshpool.yml
        #[arg(long)]
        force: bool,
    },
}
