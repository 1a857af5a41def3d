use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::daemon::DaemonAction;

#[derive(Parser, Debug)]
#[command(
    name = "graceguard",
    version,
    about = "Rate-limited, self-healing access to blocked sites"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    Config {
        #[arg(long)]
        print: bool,
    },
    /// Ask the daemon for a grace period on guarded sites
    Unblock {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Show the unblock budget and pending re-blocks
    Status {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    Daemon {
        #[command(subcommand)]
        action: DaemonCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DaemonCommand {
    Start {
        #[arg(long)]
        socket: Option<PathBuf>,
        #[arg(long)]
        pid: Option<PathBuf>,
    },
    Stop {
        #[arg(long)]
        pid: Option<PathBuf>,
    },
    Ping {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    SocketPath,
    PidPath,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => commands::config::init(path, force),
        Commands::Config { print } => {
            if print {
                commands::config::print_effective(cli.config)
            } else {
                println!("Use --print to show the effective config.");
                Ok(())
            }
        }
        Commands::Unblock { socket } => commands::unblock::execute(socket),
        Commands::Status { socket } => commands::status::execute(socket),
        Commands::Daemon { action } => {
            let action = match action {
                DaemonCommand::Start { socket, pid } => DaemonAction::Start { socket, pid },
                DaemonCommand::Stop { pid } => DaemonAction::Stop { pid },
                DaemonCommand::Ping { socket } => DaemonAction::Ping { socket },
                DaemonCommand::SocketPath => DaemonAction::SocketPath,
                DaemonCommand::PidPath => DaemonAction::PidPath,
            };
            commands::daemon::execute(action, cli.config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unblock_with_socket() {
        let cli = Cli::try_parse_from(["graceguard", "unblock", "--socket", "/tmp/gg.sock"]).unwrap();
        match cli.command {
            Commands::Unblock { socket } => assert_eq!(socket, Some(PathBuf::from("/tmp/gg.sock"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["graceguard", "daemon", "start", "--config", "/etc/gg.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/gg.toml")));
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                action: DaemonCommand::Start { socket: None, pid: None }
            }
        ));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["graceguard", "block-everything"]).is_err());
    }
}
