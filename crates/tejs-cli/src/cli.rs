use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "tejs - scripted shortcut expansion",
    long_about = "tejs replaces short triggers with the output of user-written scripts defined in shortcut files."
)]
pub struct Tejs {
    /// Settings file to use instead of ~/.tejs/settings.json
    #[clap(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log debug output and print full report details
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub commands: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Expand one trigger and print the result
    Expand {
        #[clap(help = "Trigger text, without prefix and suffix")]
        trigger: String,

        #[clap(long, short, help = "Don't report script errors or missing matches")]
        silent: bool,
    },
    /// List the documented shortcuts of every loaded source
    List,
    /// Check a shortcut file for format and script syntax errors
    Check {
        #[clap(help = "Path to the shortcut file")]
        file: PathBuf,
    },
    /// Expand triggers in lines read from stdin until EOF or `:quit`
    Session {
        #[clap(long, default_value = "1000", help = "Milliseconds between file-change polls")]
        poll_ms: u64,
    },
    /// Print the effective settings
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = Tejs::try_parse_from(["tejs", "expand", "d20", "--silent", "-v"]).unwrap();
        assert!(args.verbose);
        match args.commands {
            Some(Commands::Expand { trigger, silent }) => {
                assert_eq!(trigger, "d20");
                assert!(silent);
            }
            _ => panic!("expected expand"),
        }
    }

    #[test]
    fn session_poll_interval_has_a_default() {
        let args = Tejs::try_parse_from(["tejs", "--settings", "s.json", "session"]).unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("s.json")));
        assert!(matches!(args.commands, Some(Commands::Session { poll_ms: 1000 })));
    }
}
