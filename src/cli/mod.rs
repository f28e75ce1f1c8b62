use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod error;
pub mod handler;
pub mod output;

/// gmbridge - host side of the GM.* userscript API
#[derive(Parser, Debug)]
#[command(name = "gmbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override config directory path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (TRACE level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a bridge session for one script over stdin/stdout
    Serve {
        /// Userscript file (*.user.js)
        script: PathBuf,

        /// URL of the page the script runs in
        #[arg(long, default_value = "about:blank")]
        url: String,
    },

    /// Show the GM.info descriptor of a script
    Info {
        /// Userscript file (*.user.js)
        script: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a script runs on a URL
    Check {
        /// Userscript file (*.user.js)
        script: PathBuf,

        /// Page URL
        url: String,
    },

    /// List userscripts in the scripts directory
    Scripts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default settings.toml to the config directory
    Init {
        /// Overwrite an existing settings.toml
        #[arg(long)]
        force: bool,
    },

    /// Show stored values of a script namespace (`<@namespace>/<@name>`)
    Values {
        namespace: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
