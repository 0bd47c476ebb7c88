//! pwman - password encrypted key/value containers
//!
//! Usage:
//!   pwman init    Create a new empty container
//!   pwman list    List the entry names of a container
//!   pwman get     Print an entry
//!   pwman put     Add or replace an entry from a file
//!   pwman del     Delete an entry
//!   pwman rename  Rename an entry
//!   pwman enc     Encrypt a file
//!   pwman dec     Decrypt a file
//!   pwman pwd     Verify the password and cache it in pwserv
//!   pwman rst     Remove the cached password from pwserv
//!   pwman obf     Store obfuscated remote storage credentials
//!   pwman var     Print the environment variables pwman reads

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pwman_agent::AgentClient;
use pwman_cli::commands::{self, Session, CONTAINER_ENV_VAR};
use pwman_crypto::{CipherSuite, KdfId, Obfuscator};

#[derive(Parser)]
#[command(name = "pwman")]
#[command(author, version, about = "Password encrypted key/value containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Reach pwserv over TCP on localhost instead of the local socket
    #[arg(long, global = true)]
    tcp: bool,
}

#[derive(Args)]
struct Container {
    /// Container file
    #[arg(short = 'i', long = "file", env = CONTAINER_ENV_VAR)]
    file: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty container
    Init {
        #[command(flatten)]
        container: Container,

        /// Key derivation function (sha256-double, argon2id, scrypt)
        #[arg(long, default_value_t = KdfId::default())]
        kdf: KdfId,
    },

    /// List the entry names
    List {
        #[command(flatten)]
        container: Container,
    },

    /// Print an entry
    Get {
        #[command(flatten)]
        container: Container,

        /// Entry name
        #[arg(short, long)]
        key: String,
    },

    /// Add or replace an entry
    Put {
        #[command(flatten)]
        container: Container,

        /// Entry name
        #[arg(short, long)]
        key: String,

        /// File holding the value
        #[arg(short = 'd', long = "data-file")]
        data_file: PathBuf,
    },

    /// Delete an entry
    Del {
        #[command(flatten)]
        container: Container,

        /// Entry name
        #[arg(short, long)]
        key: String,
    },

    /// Rename an entry
    Rename {
        #[command(flatten)]
        container: Container,

        /// Current entry name
        #[arg(short, long)]
        key: String,

        /// New entry name
        #[arg(short, long)]
        new_key: String,
    },

    /// Encrypt a file
    Enc {
        /// File to encrypt
        #[arg(short = 'i', long = "in")]
        input: PathBuf,

        /// Output file, stdout if not given
        #[arg(short = 'o', long = "out")]
        output: Option<PathBuf>,

        /// Key derivation function (sha256-double, argon2id, scrypt)
        #[arg(long, default_value_t = KdfId::default())]
        kdf: KdfId,
    },

    /// Decrypt a file
    Dec {
        /// File to decrypt
        #[arg(short = 'i', long = "in")]
        input: PathBuf,

        /// Output file, stdout if not given
        #[arg(short = 'o', long = "out")]
        output: Option<PathBuf>,
    },

    /// Verify the container password and cache it in pwserv
    Pwd {
        #[command(flatten)]
        container: Container,
    },

    /// Remove the container password from pwserv
    Rst {
        #[command(flatten)]
        container: Container,
    },

    /// Store obfuscated credentials for remote storage
    Obf {
        /// User id for remote storage
        #[arg(short, long)]
        user: String,
    },

    /// Print the environment variables pwman reads
    Var,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    pwman_cli::init_logging(cli.verbose, "warn");

    let agent = AgentClient::local(cli.tcp).context("Unable to locate pwserv")?;
    let session = Session::new(CipherSuite::from_env(), Arc::new(agent));
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Init { container, kdf } => session.init(&container.file, kdf)?,
        Commands::List { container } => session.list(&container.file, &mut out).await?,
        Commands::Get { container, key } => session.get(&container.file, &key, &mut out).await?,
        Commands::Put {
            container,
            key,
            data_file,
        } => {
            session
                .put(&container.file, &key, &data_file, &mut out)
                .await?
        }
        Commands::Del { container, key } => session.delete(&container.file, &key).await?,
        Commands::Rename {
            container,
            key,
            new_key,
        } => session.rename(&container.file, &key, &new_key).await?,
        Commands::Enc { input, output, kdf } => {
            session.encrypt(&input, output.as_deref(), kdf, &mut out)?
        }
        Commands::Dec { input, output } => {
            session.decrypt(&input, output.as_deref(), &mut out).await?
        }
        Commands::Pwd { container } => session.remember(&container.file).await?,
        Commands::Rst { container } => session.forget(&container.file).await?,
        Commands::Obf { user } => {
            let obfuscator = Obfuscator::from_home()?;
            session.obfuscate(&obfuscator, &user, &mut out)?
        }
        Commands::Var => commands::variables(&mut out)?,
    }

    Ok(())
}
