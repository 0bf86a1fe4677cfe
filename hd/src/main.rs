//! hd - HA control-loop daemon
//!
//! CLI entry point: runs the daemon or queries a running one.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::fmt::MakeWriter;

use hadaemon::cli::{Cli, Command, OutputFormat};
use hadaemon::config::{Config, LogConfig};
use hadaemon::{
    ApiClient, BootstrapOutcome, Collaborators, CoordinationStore, Daemon, FileDcs, LeaseHa, Postgresql,
    RestApiServer, SignalController, load_dynamic_configuration,
};

fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", level);
            tracing::Level::INFO
        }
    }
}

/// Install the tracing subscriber
///
/// Level priority: CLI > config file > `default`. Output goes to `log.file`
/// when configured, stderr otherwise.
fn setup_logging(cli_level: Option<&str>, log: &LogConfig, default: tracing::Level) -> Result<()> {
    let level = cli_level.or(log.level.as_deref()).map(parse_level).unwrap_or(default);
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match &log.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let log_file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Load the config file while a temporary subscriber is in place
///
/// The log settings live in the config itself, so events from loading it
/// go to `writer` at the CLI level (WARN by default).
fn load_config<W>(cli: &Cli, writer: W) -> Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = cli.requested_log_level().map(parse_level).unwrap_or(tracing::Level::WARN);
    let early = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(level)
        .finish();
    tracing::subscriber::with_default(early, || Config::load(cli.config.as_ref()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli, std::io::stderr).context("Failed to load configuration")?;

    let cli_level = cli.requested_log_level().map(str::to_string);
    let command = cli.command.unwrap_or(Command::Run);
    let default_level = match command {
        Command::Run => tracing::Level::INFO,
        Command::Status { .. } | Command::Ping => tracing::Level::WARN,
    };
    setup_logging(cli_level.as_deref(), config.log(), default_level).context("Failed to setup logging")?;

    debug!(?command, "main: dispatching command");
    match command {
        Command::Run => cmd_run(config).await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Ping => cmd_ping(&config).await,
    }
}

/// Run the daemon until terminated
async fn cmd_run(mut config: Config) -> Result<()> {
    info!(
        version = hadaemon::VERSION,
        name = config.name(),
        scope = config.scope(),
        config_file = ?config.config_file(),
        "Starting hd"
    );

    let signals = SignalController::new();
    let signal_task = signals.install()?;

    let dcs = Arc::new(FileDcs::from_config(&config).context("Failed to open the coordination store")?);
    let outcome = load_dynamic_configuration(&mut config, dcs.as_ref(), &signals).await?;
    if outcome == BootstrapOutcome::Interrupted {
        info!("Terminated before startup completed, nothing to shut down");
        signal_task.abort();
        return Ok(());
    }

    let dcs: Arc<dyn CoordinationStore> = dcs;
    let collaborators = Collaborators {
        postgresql: Arc::new(Postgresql::new(config.postgresql())),
        api: Arc::new(RestApiServer::new(config.restapi(), Arc::clone(&dcs), config.name())),
        ha: Arc::new(LeaseHa::new(Arc::clone(&dcs), config.name())),
        dcs,
    };

    let result = Daemon::new(config, collaborators, signals).run_until_shutdown().await;
    signal_task.abort();

    let outcome = result?;
    info!(?outcome, "hd stopped");
    Ok(())
}

/// Print a running daemon's status
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let client = ApiClient::with_socket_path(config.restapi().listen.clone());
    if !client.socket_exists() {
        println!("hd is not running (no socket at {})", config.restapi().listen.display());
        return Ok(());
    }

    let status = client.status().await.context("Failed to query hd")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => {
            println!("hd status");
            println!("---------");
            println!("Member: {}", status.name);
            println!("Role:   {}", status.role);
            println!("Leader: {}", status.leader.as_deref().unwrap_or("none"));
            println!("Paused: {}", if status.paused { "yes" } else { "no" });
            if let Some(dynamic) = &status.config {
                println!("loop_wait: {}s, ttl: {}s", dynamic.loop_wait, dynamic.ttl);
            }
        }
    }
    Ok(())
}

/// Check a running daemon answers on its socket
async fn cmd_ping(config: &Config) -> Result<()> {
    debug!("cmd_ping: called");
    let client = ApiClient::with_socket_path(config.restapi().listen.clone());
    if !client.socket_exists() {
        println!("hd is not running");
        return Ok(());
    }

    match client.ping().await {
        Ok(version) => {
            println!("hd is alive and responsive");
            println!("Version: {}", version);
        }
        Err(e) => {
            debug!(error = %e, "cmd_ping: ping failed");
            println!("Socket exists but hd is not responding");
            println!("Error: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_config_load_events_are_logged() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hd.yml");
        fs::write(&path, "name: node7\n").unwrap();
        let cli = Cli::parse_from(["hd", "-v", "--config", path.to_str().unwrap()]);

        let buffer = Buffer::default();
        let sink = buffer.clone();
        let config = load_config(&cli, move || sink.clone()).unwrap();

        assert_eq!(config.name(), "node7");
        assert!(buffer.text().contains("Loaded config from"), "got: {}", buffer.text());
    }

    #[test]
    fn test_config_load_defaults_to_warn() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hd.yml");
        fs::write(&path, "name: node7\n").unwrap();
        let cli = Cli::parse_from(["hd", "--config", path.to_str().unwrap()]);

        let buffer = Buffer::default();
        let sink = buffer.clone();
        load_config(&cli, move || sink.clone()).unwrap();

        assert!(!buffer.text().contains("Loaded config from"));
    }
}
