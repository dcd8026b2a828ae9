//! Command server: the local socket the mail plugin talks to.
//!
//! Owns the shared state (registration store, delivery pipeline, topic) and
//! the accept loop; each accepted connection runs an independent
//! [`Session`](crate::session::Session).

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::Mutex;

use crate::error::{DaemonError, Result};
use crate::pipeline::DeliveryPipeline;
use crate::registry::RegistrationStore;
use crate::session::Session;

/// Shared state behind all command sessions.
pub struct CommandServer {
    registry: Arc<Mutex<RegistrationStore>>,
    pipeline: Arc<DeliveryPipeline>,
    topic: String,
}

impl CommandServer {
    /// Create the server around its collaborators.
    pub fn new(
        registry: RegistrationStore,
        pipeline: Arc<DeliveryPipeline>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            pipeline,
            topic: topic.into(),
        }
    }

    /// The registration store, behind its lock.
    pub fn registry(&self) -> &Mutex<RegistrationStore> {
        &self.registry
    }

    /// The delivery pipeline.
    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }

    /// Topic string returned to registering clients.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Bind the command socket.
    ///
    /// An existing path is a fatal startup error: it means another daemon
    /// holds the socket, or a previous run left state behind that the
    /// operator must clear deliberately.
    pub fn bind(&self, path: &Path) -> Result<UnixListener> {
        if path.exists() {
            return Err(DaemonError::SocketPathExists {
                path: path.to_path_buf(),
            });
        }

        let listener = UnixListener::bind(path)?;

        // The mail plugin runs as another user; open up the socket mode.
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;

        Ok(listener)
    }

    /// Accept connections forever, one session per connection.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) -> Result<()> {
        loop {
            let (stream, _) = listener.accept().await?;
            tracing::debug!("Accepted command connection");

            let session = Session::new(self.clone());
            tokio::spawn(async move {
                if let Err(e) = session.run(stream).await {
                    tracing::warn!("Session error: {}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    fn test_server(dir: &TempDir) -> Arc<CommandServer> {
        let store = RegistrationStore::open(dir.path().join("xapsd.json")).unwrap();
        Arc::new(CommandServer::new(
            store,
            Arc::new(DeliveryPipeline::new()),
            "com.example.mail",
        ))
    }

    #[tokio::test]
    async fn existing_socket_path_fails_startup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xapsd.sock");
        std::fs::write(&path, "").unwrap();

        let server = test_server(&dir);
        assert!(matches!(
            server.bind(&path),
            Err(DaemonError::SocketPathExists { .. })
        ));
    }

    #[tokio::test]
    async fn serves_sessions_over_the_unix_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xapsd.sock");

        let server = test_server(&dir);
        let listener = server.bind(&path).unwrap();
        let accept_loop = tokio::spawn(server.clone().serve(listener));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream
            .write_all(b"NOTIFY dovecot-username=\"stefan\"\tdovecot-mailbox=\"Inbox\"\n")
            .await
            .unwrap();

        let mut reply = String::new();
        BufReader::new(&mut stream)
            .read_line(&mut reply)
            .await
            .unwrap();
        assert_eq!(reply, "OK \n");

        accept_loop.abort();
    }

    #[tokio::test]
    async fn socket_is_writable_by_other_users() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xapsd.sock");

        let server = test_server(&dir);
        let _listener = server.bind(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
