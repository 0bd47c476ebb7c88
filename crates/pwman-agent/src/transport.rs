//! Local transports for the agent
//!
//! An [`Endpoint`] knows how to prepare and bind the listening side and how
//! to dial it from a client. On Unix the domain socket lives at
//! `/tmp/<username>.pwman` and is created with a `0077` umask so only the
//! owning user can connect. On Windows it is an AF_UNIX socket at
//! `<home>/pwman.sock`, served through blocking `uds_windows` sockets bridged
//! onto the runtime. TCP on loopback has no such protection: any local user
//! can reach it, so it is only used when asked for or when the platform has
//! no local sockets at all.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
#[cfg(any(unix, windows))]
use std::path::{Path, PathBuf};
#[cfg(windows)]
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::Result;

/// Fixed loopback port of the TCP fallback
pub const DEFAULT_TCP_PORT: u16 = 4567;

/// A bidirectional byte stream to or from the agent
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type Connection = Box<dyn Stream>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(any(unix, windows))]
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Per-user local socket where available, TCP loopback otherwise
    pub fn local() -> Result<Self> {
        #[cfg(any(unix, windows))]
        {
            Ok(Self::Unix(default_socket_path()?))
        }

        #[cfg(not(any(unix, windows)))]
        {
            tracing::warn!("no local socket support, falling back to TCP on loopback");
            Ok(Self::tcp(DEFAULT_TCP_PORT))
        }
    }

    pub fn tcp(port: u16) -> Self {
        Self::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            #[cfg(any(unix, windows))]
            Self::Unix(_) => "unix",
            Self::Tcp(_) => "tcp",
        }
    }

    pub fn address(&self) -> String {
        match self {
            #[cfg(any(unix, windows))]
            Self::Unix(path) => path.display().to_string(),
            Self::Tcp(addr) => addr.to_string(),
        }
    }

    /// Prepare the endpoint and start listening.
    ///
    /// For Unix sockets a stale socket file from a previous run is removed
    /// and the umask is restricted before binding.
    pub async fn bind(&self) -> Result<Listener> {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => {
                prepare_unix_socket(path)?;
                let listener = UnixListener::bind(path)?;
                Ok(Listener::Unix(listener))
            }
            #[cfg(windows)]
            Self::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = uds_windows::UnixListener::bind(path)?;
                Ok(Listener::Unix(Arc::new(listener)))
            }
            Self::Tcp(addr) => {
                tracing::warn!(%addr, "TCP transport is reachable by every local user");
                let listener = TcpListener::bind(addr).await?;
                Ok(Listener::Tcp(listener))
            }
        }
    }

    /// Connect to an agent listening on this endpoint
    pub async fn dial(&self) -> Result<Connection> {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => Ok(Box::new(UnixStream::connect(path).await?)),
            #[cfg(windows)]
            Self::Unix(path) => {
                let path = path.clone();
                let stream = tokio::task::spawn_blocking(move || uds_windows::UnixStream::connect(path))
                    .await
                    .map_err(io::Error::other)??;
                Ok(bridge(stream)?)
            }
            Self::Tcp(addr) => Ok(Box::new(TcpStream::connect(addr).await?)),
        }
    }
}

pub enum Listener {
    #[cfg(unix)]
    Unix(UnixListener),
    #[cfg(windows)]
    Unix(Arc<uds_windows::UnixListener>),
    Tcp(TcpListener),
}

impl Listener {
    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            #[cfg(unix)]
            Self::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            #[cfg(windows)]
            Self::Unix(listener) => {
                let listener = Arc::clone(listener);
                let (stream, _) = tokio::task::spawn_blocking(move || listener.accept())
                    .await
                    .map_err(io::Error::other)??;
                bridge(stream)
            }
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }
}

#[cfg(any(unix, windows))]
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(unix)]
fn prepare_unix_socket(path: &Path) -> io::Result<()> {
    remove_stale_socket(path)?;

    // SAFETY: umask only swaps the process file mode creation mask
    unsafe {
        libc::umask(0o077);
    }
    Ok(())
}

/// `/tmp/<username>.pwman`
#[cfg(unix)]
pub fn default_socket_path() -> Result<PathBuf> {
    Ok(PathBuf::from(format!("/tmp/{}.pwman", current_username()?)))
}

/// `<home>/pwman.sock`
#[cfg(windows)]
pub fn default_socket_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(crate::AgentError::HomeDirUnavailable)?;
    Ok(home.join("pwman.sock"))
}

/// Expose a blocking AF_UNIX stream as an async [`Connection`].
///
/// One blocking task pumps socket -> pipe, another pipe -> socket. Either
/// side closing ends its direction only.
#[cfg(windows)]
fn bridge(stream: uds_windows::UnixStream) -> io::Result<Connection> {
    use std::io::Write;
    use tokio_util::io::SyncIoBridge;

    let mut inbound = stream.try_clone()?;
    let mut outbound = stream;
    let (ours, theirs) = tokio::io::duplex(crate::protocol::MAX_FRAME_LEN + 2);
    let (pipe_read, pipe_write) = tokio::io::split(theirs);
    let mut sink = SyncIoBridge::new(pipe_write);
    let mut source = SyncIoBridge::new(pipe_read);

    tokio::task::spawn_blocking(move || {
        if let Err(e) = std::io::copy(&mut inbound, &mut sink) {
            tracing::debug!(error = %e, "socket read ended");
        }
        let _ = sink.flush();
        let _ = sink.shutdown();
    });

    tokio::task::spawn_blocking(move || {
        if let Err(e) = std::io::copy(&mut source, &mut outbound) {
            tracing::debug!(error = %e, "socket write ended");
        }
        let _ = outbound.flush();
        let _ = outbound.shutdown(std::net::Shutdown::Write);
    });

    Ok(Box::new(ours))
}

#[cfg(unix)]
fn current_username() -> Result<String> {
    use std::ffi::CStr;

    // SAFETY: getpwuid returns a pointer into static storage or null; the
    // name is copied out before any other passwd call can overwrite it.
    unsafe {
        let passwd = libc::getpwuid(libc::getuid());
        if passwd.is_null() || (*passwd).pw_name.is_null() {
            return Err(crate::AgentError::UsernameUnavailable);
        }
        Ok(CStr::from_ptr((*passwd).pw_name).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[cfg(unix)]
    #[test]
    fn test_default_socket_path_shape() {
        let path = default_socket_path().unwrap();
        let name = path.to_string_lossy();

        assert!(name.starts_with("/tmp/"));
        assert!(name.ends_with(".pwman"));
    }

    #[cfg(windows)]
    #[test]
    fn test_default_socket_path_is_in_home() {
        let path = default_socket_path().unwrap();

        assert_eq!(path.file_name().unwrap(), "pwman.sock");
        assert_eq!(path.parent(), dirs::home_dir().as_deref());
        assert_eq!(Endpoint::local().unwrap().kind(), "unix");
    }

    #[test]
    fn test_tcp_is_loopback() {
        let endpoint = Endpoint::tcp(DEFAULT_TCP_PORT);
        assert_eq!(endpoint.kind(), "tcp");
        assert_eq!(endpoint.address(), "127.0.0.1:4567");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_bind_replaces_stale_socket_and_restricts_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.pwman");
        std::fs::write(&path, b"stale").unwrap();

        let endpoint = Endpoint::Unix(path.clone());
        let listener = endpoint.bind().await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);

        let accept = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut client = endpoint.dial().await.unwrap();
        client.write_all(b"ping").await.unwrap();
        assert_eq!(&accept.await.unwrap(), b"ping");
    }

    #[cfg(windows)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_windows_socket_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pwman.sock");
        std::fs::write(&path, b"stale").unwrap();

        let endpoint = Endpoint::Unix(path);
        let listener = endpoint.bind().await.unwrap();

        let accept = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).await.unwrap();
            conn.write_all(b"pong").await.unwrap();
            conn.shutdown().await.unwrap();
            buf
        });

        let mut client = endpoint.dial().await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"pong");
        assert_eq!(&accept.await.unwrap(), b"ping");
    }
}
