//! Command-line argument parsing for the tessera client
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};

/// tessera - shared-object toolkit client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Connection address (tcp://host:port or unix://path)
    ///
    /// Overrides the default Unix socket under the XDG runtime dir.
    /// Example: tcp://127.0.0.1:4461 or unix:///tmp/tessera.sock
    #[arg(long, env = "TESSERA_ADDR")]
    pub addr: Option<String>,

    /// Client name to attach under (defaults to a generated one)
    #[arg(long, short = 'n', env = "TESSERA_NAME")]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List bound session names
    List,

    /// Bind a new session
    Bind { session: String },

    /// Unbind (destroy) a session
    Unbind { session: String },

    /// Show a session's bound info and members
    Info { session: String },

    /// Grab a token in a session
    Grab {
        session: String,
        token: String,
        /// Share the token instead of holding it exclusively
        #[arg(long)]
        shared: bool,
    },

    /// Release a held token
    Release { session: String, token: String },

    /// Report a token's status and holders
    Test { session: String, token: String },

    /// Ask the current holders to release or give the token
    Request { session: String, token: String },

    /// Give a held token to another client
    Give {
        session: String,
        token: String,
        recipient: String,
    },

    /// Send data to a channel
    Send {
        session: String,
        channel: String,
        data: String,
    },

    /// Set a byte array's value
    Set {
        session: String,
        array: String,
        value: String,
    },

    /// Join a session and print its events until interrupted
    Monitor { session: String },
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_command() {
        let args = Args::parse_from(["tessera", "list"]);
        assert!(matches!(args.command, Command::List));
        assert!(args.addr.is_none());
        assert!(args.name.is_none());
    }

    #[test]
    fn test_grab_flags() {
        let args = Args::parse_from(["tessera", "grab", "whiteboard", "baton"]);
        match args.command {
            Command::Grab {
                session,
                token,
                shared,
            } => {
                assert_eq!(session, "whiteboard");
                assert_eq!(token, "baton");
                assert!(!shared);
            }
            _ => panic!("Expected Grab"),
        }

        let args = Args::parse_from(["tessera", "grab", "whiteboard", "baton", "--shared"]);
        assert!(matches!(args.command, Command::Grab { shared: true, .. }));
    }

    #[test]
    fn test_addr_and_name_flags() {
        let args = Args::parse_from([
            "tessera",
            "--addr",
            "tcp://localhost:4461",
            "-n",
            "alice",
            "list",
        ]);
        assert_eq!(args.addr.as_deref(), Some("tcp://localhost:4461"));
        assert_eq!(args.name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_give_command() {
        let args = Args::parse_from(["tessera", "give", "whiteboard", "baton", "bob"]);
        match args.command {
            Command::Give {
                session,
                token,
                recipient,
            } => {
                assert_eq!(session, "whiteboard");
                assert_eq!(token, "baton");
                assert_eq!(recipient, "bob");
            }
            _ => panic!("Expected Give"),
        }
    }
}
