//! CLI surface (C9), matching the external interface's flag table exactly.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "midi-router",
    about = "Headless MIDI router and clock generator",
    disable_help_flag = true
)]
pub struct Cli {
    /// Print this help message.
    #[arg(long = "help", action = clap::ArgAction::Help)]
    pub help: Option<bool>,

    /// Open every discovered MIDI input port, ignoring the configured
    /// mapping list.
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Path to the router configuration document.
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "./config.json")]
    pub config: String,

    /// Run the interactive configuration wizard (an external tool; this
    /// flag is accepted for CLI compatibility but not implemented here).
    #[arg(long = "configure")]
    pub configure: bool,

    /// List discovered MIDI ports and exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Reconcile device connect/disconnect events at runtime.
    #[arg(short = 'h', long = "hotplug", default_value_t = true)]
    pub hotplug: bool,

    /// Lower the logger's minimum severity from Info to Debug.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
