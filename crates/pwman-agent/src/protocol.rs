//! Length prefixed JSON protocol
//!
//! Each message is a 2 byte big-endian length followed by exactly that many
//! bytes of JSON. Reads are strict: a short read is an I/O error and there is
//! no resynchronization. Missing string fields decode as empty, and a frame
//! that does not decode as a request is still answered with an error.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cache::PasswordStore;
use crate::{AgentError, Result};

/// Largest payload a frame can carry
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

pub const RESULT_OK: i32 = 0;
pub const RESULT_ERROR: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Get,
    Set,
    Reset,
    Unknown(String),
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        match value.as_str() {
            "GET" => Self::Get,
            "SET" => Self::Set,
            "RST" => Self::Reset,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        match command {
            Command::Get => "GET".to_string(),
            Command::Set => "SET".to_string(),
            Command::Reset => "RST".to_string(),
            Command::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub pw_name: String,
    #[serde(default)]
    pub pw_data: String,
}

impl Request {
    pub fn get(name: &str) -> Self {
        Self {
            command: Command::Get,
            pw_name: name.to_string(),
            pw_data: String::new(),
        }
    }

    pub fn set(name: &str, password: &str) -> Self {
        Self {
            command: Command::Set,
            pw_name: name.to_string(),
            pw_data: password.to_string(),
        }
    }

    pub fn reset(name: &str) -> Self {
        Self {
            command: Command::Reset,
            pw_name: name.to_string(),
            pw_data: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub result_code: i32,
    #[serde(default)]
    pub result_data: String,
}

impl Response {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            result_code: RESULT_OK,
            result_data: data.into(),
        }
    }

    pub fn error() -> Self {
        Self {
            result_code: RESULT_ERROR,
            result_data: String::new(),
        }
    }
}

/// Write one frame. Nothing is written if the payload is too large.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(AgentError::PayloadTooLarge(payload.len()));
    }

    writer.write_all(&(payload.len() as u16).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix).await?;

    let mut payload = vec![0u8; u16::from_be_bytes(prefix) as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}

pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Client side transaction: send the request, read the response.
///
/// A non-OK result code is returned as [`AgentError::Rejected`] carrying the
/// response data.
pub async fn transact<S>(stream: &mut S, request: &Request) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_message(stream, request).await?;
    let response: Response = read_message(stream).await?;

    if response.result_code != RESULT_OK {
        return Err(AgentError::Rejected {
            code: response.result_code,
            data: response.result_data,
        });
    }

    Ok(response.result_data)
}

/// Server side transaction: read one request, answer it from `store`.
pub async fn serve_request<S, P>(stream: &mut S, store: &P) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: PasswordStore + ?Sized,
{
    let payload = read_frame(stream).await?;
    let request: Request = match serde_json::from_slice(&payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable request");
            return write_message(stream, &Response::error()).await;
        }
    };

    let outcome = match &request.command {
        Command::Get => store.get_password(&request.pw_name).await,
        Command::Set => store
            .set_password(&request.pw_name, &request.pw_data)
            .await
            .map(|_| String::new()),
        Command::Reset => store
            .reset_password(&request.pw_name)
            .await
            .map(|_| String::new()),
        Command::Unknown(other) => {
            tracing::warn!(command = %other, "unknown command");
            Err(AgentError::Rejected {
                code: RESULT_ERROR,
                data: String::new(),
            })
        }
    };

    let response = match outcome {
        Ok(data) => Response::ok(data),
        Err(e) => {
            tracing::debug!(name = %request.pw_name, error = %e, "request failed");
            Response::error()
        }
    };

    write_message(stream, &response).await
}
