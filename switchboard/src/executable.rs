//! Main entry point for CLI command to start server.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use clap::Parser;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::configuration::Configuration;
use crate::configuration::generate_config_schema;
use crate::router::Gateway;
use crate::router::ShutdownSource;

/// Listen address passed on the command line, read back during configuration expansion.
pub(crate) static SWITCHBOARD_LISTEN_ADDRESS: Mutex<Option<SocketAddr>> = Mutex::new(None);

/// Options for the gateway
#[derive(Parser, Debug)]
#[clap(name = "switchboard", about = "GraphQL gateway for the chat schema")]
#[command(disable_version_flag(true))]
pub struct Opt {
    /// Log filter (off|error|warn|info|debug|trace, or any `tracing` directive).
    /// Falls back to `RUST_LOG`, then `info`.
    #[clap(long = "log", alias = "log-level", env = "SWITCHBOARD_LOG")]
    log_level: Option<String>,

    /// Configuration location relative to the project directory.
    #[clap(short, long = "config", env = "SWITCHBOARD_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// The listen address, overriding `server.listen`.
    #[clap(long)]
    listen: Option<SocketAddr>,

    /// Prints the configuration schema.
    #[clap(long)]
    schema: bool,

    /// Prints the GraphQL schema.
    #[clap(long)]
    print_sdl: bool,

    /// Display version and exit.
    #[clap(action = clap::ArgAction::SetTrue, long, short = 'V')]
    pub(crate) version: bool,
}

/// This is the main gateway entrypoint.
pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(nb) = std::env::var("SWITCHBOARD_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(nb);
    }
    let runtime = builder.build()?;
    runtime.block_on(Executable::builder().start())
}

/// Entry point into creating a gateway executable.
#[non_exhaustive]
pub struct Executable {}

#[buildstructor::buildstructor]
impl Executable {
    /// Build an executable that will parse commandline options and set up logging.
    ///
    /// Note that if you do not specify a runtime you must be in the context of an existing tokio runtime.
    #[builder(entry = "builder", exit = "start", visibility = "pub")]
    async fn start(shutdown: Option<ShutdownSource>) -> Result<()> {
        Self::inner_start(shutdown, Opt::parse()).await
    }

    async fn inner_start(shutdown: Option<ShutdownSource>, opt: Opt) -> Result<()> {
        if opt.version {
            println!("{}", std::env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        if opt.schema {
            let schema = generate_config_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        if opt.print_sdl {
            print!("{}", crate::chat::SCHEMA);
            return Ok(());
        }

        init_tracing(opt.log_level.as_deref())?;

        *SWITCHBOARD_LISTEN_ADDRESS.lock() = opt.listen;

        let configuration = match &opt.config_path {
            Some(path) => {
                let path = if path.is_relative() {
                    std::env::current_dir()?.join(path)
                } else {
                    path.clone()
                };
                tracing::info!(path = %path.display(), "loading configuration");
                Configuration::from_file(&path)
                    .with_context(|| format!("could not load {}", path.display()))?
            }
            None => Configuration::from_str("")?,
        };

        tracing::info!(
            "Switchboard v{} // users: {}, messages: {}",
            std::env!("CARGO_PKG_VERSION"),
            configuration.sources().users.kind(),
            configuration.sources().messages.kind(),
        );

        let gateway = Gateway::new(configuration)?;
        if let Err(err) = gateway
            .serve(shutdown.unwrap_or(ShutdownSource::CtrlC))
            .await
        {
            tracing::error!("{}", err);
            return Err(err.into());
        }
        Ok(())
    }
}

/// Text output on a terminal, JSON otherwise.
fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(log_level) => {
            EnvFilter::try_new(log_level).context("could not parse log configuration")?
        }
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
    };

    let builder = tracing_subscriber::fmt::fmt().with_env_filter(filter);
    if std::io::stdout().is_terminal() {
        builder.try_init()
    } else {
        builder.json().try_init()
    }
    .map_err(|e| anyhow!(e))
}
