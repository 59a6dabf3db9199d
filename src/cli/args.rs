use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "coachline")]
#[command(about = "Live meeting coaching over chat, team threads and SMS", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the coaching service (default)
    Serve(ServeCliArgs),
    /// Print version information
    Version,
    /// Inspect the configuration file
    Config(ConfigCliArgs),
    /// List sessions on a running service
    Sessions(ClientCliArgs),
    /// Stop a session on a running service
    Stop(StopCliArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct ServeCliArgs {
    /// Override the configured listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration with credentials masked
    Show,
    /// Print the configuration file path
    Path,
}

#[derive(ClapArgs, Debug)]
pub struct ClientCliArgs {
    /// Base URL of the running service (default: from config)
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct StopCliArgs {
    /// Session (bot) id to stop
    pub session_id: String,
    #[command(flatten)]
    pub client: ClientCliArgs,
}
