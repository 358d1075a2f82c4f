use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "recorder-cli", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Server API root, e.g. https://rec.example.com/api
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Optional client config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Connect/response timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// User to log in as when the server asks for a session
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive terminal UI (default)
    Tui {
        /// View refresh interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Directory downloads are saved to
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// Check credentials and remember the user for this server
    Login,

    /// End the server session and forget the remembered user
    Logout,

    /// List recording tasks
    Records,

    /// Start recording a room
    Start { room_id: u64 },

    /// Stop recording a room
    Stop { room_id: u64 },

    /// List a directory of recorded files
    Files {
        /// Directory relative to the recordings root
        #[arg(default_value = "")]
        path: String,
    },

    /// Download a recorded file
    Download {
        path: String,

        /// Destination file or directory (defaults to the download directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete one or more files or directories
    Delete {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Issue a share link for a file
    Share { path: String },

    /// Queue a file for conversion
    Convert {
        path: String,

        /// Target container, e.g. mp4
        #[arg(long, default_value = "mp4")]
        format: String,

        /// Remove the source file once converted
        #[arg(long)]
        delete_source: bool,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// List conversion tasks
    Converts,

    /// Cancel a conversion task
    CancelConvert {
        task_id: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// List subscribed rooms
    Subscriptions,

    /// Subscribe to a room
    Subscribe { room_id: u64 },

    /// Unsubscribe from a room
    Unsubscribe {
        room_id: u64,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let args = Args::try_parse_from(["recorder-cli", "--server", "http://x"]).unwrap();
        assert!(args.cmd.is_none());
        assert_eq!(args.server.as_deref(), Some("http://x"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from(["recorder-cli", "delete", "a.flv", "sub/b.mp4", "--yes", "--json"]).unwrap();
        assert!(args.json);
        match args.cmd {
            Some(Command::Delete { paths, yes }) => {
                assert_eq!(paths, vec!["a.flv", "sub/b.mp4"]);
                assert!(yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn convert_defaults_to_mp4() {
        let args = Args::try_parse_from(["recorder-cli", "convert", "a.flv"]).unwrap();
        match args.cmd {
            Some(Command::Convert { format, delete_source, .. }) => {
                assert_eq!(format, "mp4");
                assert!(!delete_source);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn delete_requires_a_path() {
        assert!(Args::try_parse_from(["recorder-cli", "delete"]).is_err());
    }
}
