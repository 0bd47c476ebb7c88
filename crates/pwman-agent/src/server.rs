//! The credential cache agent
//!
//! Lifecycle: bind (removing any stale socket) -> accept loop on a dedicated
//! task -> one request per connection -> shutdown when the cancellation
//! token fires. By default connections are served strictly one after the
//! other; [`ServeMode::Concurrent`] handles each on its own task while still
//! sharing the single mutex guarded cache.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CredentialCache;
use crate::protocol;
use crate::transport::{Connection, Endpoint, Listener};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServeMode {
    /// Finish each connection before accepting the next
    #[default]
    Sequential,
    /// Serve each connection on its own task
    Concurrent,
}

pub struct Agent {
    endpoint: Endpoint,
    cache: Arc<CredentialCache>,
    mode: ServeMode,
}

impl Agent {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            cache: Arc::new(CredentialCache::new()),
            mode: ServeMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bind the endpoint and spawn the accept loop.
    ///
    /// Returns once the agent is listening. The returned task finishes after
    /// `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let listener = self.endpoint.bind().await?;
        info!(
            kind = self.endpoint.kind(),
            address = %self.endpoint.address(),
            mode = ?self.mode,
            "agent listening"
        );

        Ok(tokio::spawn(accept_loop(
            listener,
            self.cache,
            self.mode,
            shutdown,
        )))
    }
}

async fn accept_loop(
    listener: Listener,
    cache: Arc<CredentialCache>,
    mode: ServeMode,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let conn = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                if shutdown.is_cancelled() {
                    break;
                }
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        match mode {
            ServeMode::Sequential => handle_connection(conn, &cache, &shutdown).await,
            ServeMode::Concurrent => {
                let cache = Arc::clone(&cache);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { handle_connection(conn, &cache, &shutdown).await });
            }
        }
    }

    drop(listener);
    info!("agent stopped");
}

async fn handle_connection(mut conn: Connection, cache: &CredentialCache, shutdown: &CancellationToken) {
    let served = tokio::select! {
        _ = shutdown.cancelled() => return,
        served = protocol::serve_request(&mut conn, cache) => served,
    };

    if let Err(e) = served {
        warn!(error = %e, "unable to serve request");
        return;
    }

    if let Err(e) = conn.shutdown().await {
        debug!(error = %e, "connection close failed");
    }
}
