// CLI module - User-facing command-line interface

mod output;

pub use output::print_error;

use crate::config::DEFAULT_CONTROL_URI;
use crate::error::{Result, SupervisorError};
use crate::ipc::client::IpcClient;
use crate::ipc::protocol::Command;
use clap::{Parser, Subcommand};

/// procward - control a running procward daemon
#[derive(Parser, Debug)]
#[command(name = "procward")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Control endpoint of the daemon (unix:<path> or tcp://host:port)
    #[arg(short = 'c', long = "control", default_value = DEFAULT_CONTROL_URI)]
    control_uri: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the status of one process, or of all of them
    Status {
        /// Process name (all processes when omitted)
        name: Option<String>,
    },

    /// Start a stopped process
    Start {
        /// Process name
        name: String,
    },

    /// Stop a running process
    Stop {
        /// Process name
        name: String,
    },
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    fn execute(&self) -> Result<()> {
        let client = IpcClient::connect_uri(&self.control_uri)?;
        let response = client.send_command(self.build_command())?;

        match response.result {
            Ok(data) => {
                output::print_success(&data);
                Ok(())
            }
            Err(error_msg) => Err(SupervisorError::Other(error_msg)),
        }
    }

    fn build_command(&self) -> Command {
        match &self.command {
            Commands::Status { name } => Command::Status {
                target: name.clone().unwrap_or_default(),
            },
            Commands::Start { name } => Command::Start {
                target: name.clone(),
            },
            Commands::Stop { name } => Command::Stop {
                target: name.clone(),
            },
        }
    }
}
