//! Unix socket status server

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::StatusApi;
use super::messages::{ApiRequest, ApiResponse, NodeStatus};
use crate::config::RestApiConfig;
use crate::dcs::CoordinationStore;

/// Requests are tiny; anything bigger is not ours
const MAX_REQUEST_SIZE: usize = 1024;

/// Bind a listener, replacing a stale socket file from a previous run
pub fn create_listener_at(socket_path: &Path) -> Result<UnixListener> {
    debug!(?socket_path, "create_listener_at: called");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener_at: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    UnixListener::bind(socket_path).context(format!("Failed to bind status socket {}", socket_path.display()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        debug!(?socket_path, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "Failed to remove socket file");
        }
    }
}

async fn read_request(stream: &mut UnixStream) -> Result<ApiRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await.context("Failed to read request")?;

    if bytes_read > MAX_REQUEST_SIZE {
        eyre::bail!("Request too large: {} bytes", bytes_read);
    }
    if line.is_empty() {
        eyre::bail!("Empty request received");
    }

    serde_json::from_str(line.trim()).context("Failed to parse request")
}

async fn send_response(stream: &mut UnixStream, response: &ApiResponse) -> Result<()> {
    let json = serde_json::to_string(response).context("Failed to serialize response")?;
    stream.write_all(json.as_bytes()).await.context("Failed to write response")?;
    stream.write_all(b"\n").await.context("Failed to write newline")?;
    stream.flush().await.context("Failed to flush response")?;
    Ok(())
}

/// Answers requests from the coordination store's cached snapshot
struct Responder {
    dcs: Arc<dyn CoordinationStore>,
    name: String,
}

impl Responder {
    fn status(&self) -> NodeStatus {
        let cluster = self.dcs.cached_cluster();
        let leader = cluster.as_ref().and_then(|c| c.live_leader()).map(|l| l.name.clone());
        let role = match (&cluster, &leader) {
            (None, _) => "unknown",
            (Some(_), Some(leader)) if *leader == self.name => "leader",
            (Some(_), _) => "replica",
        };
        NodeStatus {
            name: self.name.clone(),
            role: role.to_string(),
            leader,
            paused: cluster.as_ref().is_some_and(|c| c.is_paused()),
            config: cluster.and_then(|c| c.config),
        }
    }

    fn respond(&self, request: ApiRequest) -> ApiResponse {
        match request {
            ApiRequest::Ping => ApiResponse::Pong {
                version: crate::VERSION.to_string(),
            },
            ApiRequest::Status => ApiResponse::Status(self.status()),
        }
    }

    async fn handle(&self, mut stream: UnixStream) -> Result<()> {
        let response = match read_request(&mut stream).await {
            Ok(request) => {
                debug!(?request, "handle: request");
                self.respond(request)
            }
            Err(e) => ApiResponse::Error {
                message: format!("{:#}", e),
            },
        };
        send_response(&mut stream, &response).await
    }
}

async fn serve(listener: UnixListener, responder: Arc<Responder>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    if let Err(e) = responder.handle(stream).await {
                        debug!(error = %e, "Status connection failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept status connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

struct Running {
    path: PathBuf,
    task: JoinHandle<()>,
}

/// Status endpoint on a Unix socket
pub struct RestApiServer {
    responder: Arc<Responder>,
    listen: Mutex<PathBuf>,
    running: Mutex<Option<Running>>,
}

impl RestApiServer {
    pub fn new(config: &RestApiConfig, dcs: Arc<dyn CoordinationStore>, name: impl Into<String>) -> Self {
        Self {
            responder: Arc::new(Responder { dcs, name: name.into() }),
            listen: Mutex::new(config.listen.clone()),
            running: Mutex::new(None),
        }
    }

    /// Socket path the server is (or will be) listening on
    pub fn socket_path(&self) -> PathBuf {
        self.listen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn bind_and_spawn(&self) -> Result<()> {
        let path = self.socket_path();
        let listener = create_listener_at(&path)?;
        let task = tokio::spawn(serve(listener, Arc::clone(&self.responder)));
        info!(path = %path.display(), "Status API listening");

        let previous = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Running { path, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }
        Ok(())
    }

    fn stop_serving(&self) -> Option<PathBuf> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        running.task.abort();
        cleanup_socket(&running.path);
        Some(running.path)
    }
}

#[async_trait]
impl StatusApi for RestApiServer {
    async fn start(&self) -> Result<()> {
        self.bind_and_spawn()
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(path) = self.stop_serving() {
            info!(path = %path.display(), "Status API stopped");
        }
        Ok(())
    }

    async fn reload_config(&self, config: &RestApiConfig) -> Result<()> {
        {
            let mut listen = self.listen.lock().unwrap_or_else(|e| e.into_inner());
            if *listen == config.listen {
                return Ok(());
            }
            *listen = config.listen.clone();
        }

        if self.stop_serving().is_some() {
            info!(path = %config.listen.display(), "Status API socket moved, rebinding");
            self.bind_and_spawn()?;
        }
        Ok(())
    }
}
