pub mod cache;

use std::path::PathBuf;

use clap::Parser;

use self::cache::{CacheCommand, CacheOptions};

#[derive(Parser)]
#[command(about = "Inspect and drive a local HTTP response cache")]
struct Args {
    #[clap(subcommand)]
    pub command: CacheCommand,
    /// Path to the config file. Defaults to ~/.config/rcache/config
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Config profile to read
    #[clap(long, global = true, default_value = "default")]
    pub profile: String,
    /// Verbose mode. Logs to STDERR
    #[clap(long, short, global = true)]
    pub verbose: bool,
}

pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub profile: String,
    pub verbose: bool,
}

pub struct OptionArgs {
    pub cli_options: CacheOptions,
    pub cli_args: CliArgs,
}

// Parse cli and return the options. clap types stay private to this module
// so changes in its API do not leak further down the stack.
pub fn parse_cli() -> OptionArgs {
    let args = Args::parse();
    OptionArgs {
        cli_options: args.command.into(),
        cli_args: CliArgs {
            config: args.config,
            profile: args.profile,
            verbose: args.verbose,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_args_after_subcommand() {
        let args = Args::parse_from(["rc", "stats", "--profile", "work", "-v"]);
        assert_eq!("work", args.profile);
        assert!(args.verbose);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_default_profile() {
        let args = Args::parse_from(["rc", "--config", "/tmp/rc.conf", "info"]);
        assert_eq!("default", args.profile);
        assert_eq!(Some(PathBuf::from("/tmp/rc.conf")), args.config);
    }
}
