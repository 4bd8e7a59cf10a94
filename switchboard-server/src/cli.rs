//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway
    Serve {
        /// Path to configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Check a configuration file and exit
    ValidateConfig {
        /// Path to configuration file
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },

    /// Print the effective configuration as YAML
    PrintConfig {
        /// Path to configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List the tools the gateway serves
    Tools,
}
