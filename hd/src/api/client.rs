//! Client for a running daemon's status socket

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::messages::{ApiRequest, ApiResponse, NodeStatus};

/// Default timeout for socket operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status responses carry the cluster config, so allow more than requests
const MAX_RESPONSE_SIZE: usize = 64 * 1024;

/// Talks to `hd run` over its status socket
#[derive(Debug, Clone)]
pub struct ApiClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ApiClient {
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Check the daemon is alive and get its version
    pub async fn ping(&self) -> Result<String> {
        match self.send(ApiRequest::Ping).await? {
            ApiResponse::Pong { version } => Ok(version),
            ApiResponse::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            other => Err(eyre::eyre!("Unexpected response: {:?}", other)),
        }
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        match self.send(ApiRequest::Status).await? {
            ApiResponse::Status(status) => Ok(status),
            ApiResponse::Error { message } => Err(eyre::eyre!("Daemon error: {}", message)),
            other => Err(eyre::eyre!("Unexpected response: {:?}", other)),
        }
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        debug!(?self.socket_path, ?request, "ApiClient: sending request");

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .context(format!("Failed to connect to {}", self.socket_path.display()))?;

        let json = serde_json::to_string(&request).context("Failed to serialize request")?;
        tokio::time::timeout(self.timeout, async {
            stream.write_all(json.as_bytes()).await.context("Failed to write request")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new(&mut stream);
        let mut line = String::new();
        let bytes_read = tokio::time::timeout(self.timeout, reader.read_line(&mut line))
            .await
            .context("Read timeout")?
            .context("Failed to read response")?;
        if bytes_read > MAX_RESPONSE_SIZE {
            eyre::bail!("Response too large: {} bytes", bytes_read);
        }
        if line.is_empty() {
            eyre::bail!("Daemon closed the connection without answering");
        }

        let response: ApiResponse = serde_json::from_str(line.trim()).context("Failed to parse daemon response")?;
        debug!(?response, "ApiClient: received response");
        Ok(response)
    }
}
