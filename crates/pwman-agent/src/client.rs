//! Client side of the agent protocol
//!
//! Every call opens a fresh connection, performs exactly one request and
//! closes it again.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::cache::PasswordStore;
use crate::protocol::{self, Request};
use crate::transport::Endpoint;
use crate::{AgentError, Result};

#[derive(Debug, Clone)]
pub struct AgentClient {
    endpoint: Endpoint,
}

impl AgentClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Client for the agent on the default local transport, or on the TCP
    /// fallback port when `tcp` is set
    pub fn local(tcp: bool) -> Result<Self> {
        let endpoint = if tcp {
            Endpoint::tcp(crate::DEFAULT_TCP_PORT)
        } else {
            Endpoint::local()?
        };
        Ok(Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, request: &Request) -> Result<String> {
        let mut conn = self.endpoint.dial().await?;
        let answer = protocol::transact(&mut conn, request).await;

        // The server closes after answering; a failed close changes nothing
        let _ = conn.shutdown().await;
        answer
    }
}

#[async_trait]
impl PasswordStore for AgentClient {
    /// An agent refusing a GET is reported as [`AgentError::KeyNotFound`]
    async fn get_password(&self, name: &str) -> Result<String> {
        match self.send(&Request::get(name)).await {
            Err(AgentError::Rejected { .. }) => Err(AgentError::KeyNotFound(name.to_string())),
            other => other,
        }
    }

    async fn set_password(&self, name: &str, password: &str) -> Result<()> {
        self.send(&Request::set(name, password)).await.map(|_| ())
    }

    async fn reset_password(&self, name: &str) -> Result<()> {
        self.send(&Request::reset(name)).await.map(|_| ())
    }
}
