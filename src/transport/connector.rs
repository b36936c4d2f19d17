use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{self, Context, Poll};

use hyper::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpStream, UnixStream};
use tower::Service;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connector that dials a fixed unix domain socket, whatever the request URI says.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Service<Uri> for UnixConnector {
    type Response = TokioIo<UnixStream>;

    type Error = io::Error;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move {
            log::trace!("Connecting to {}...", path.display());
            let stream = UnixStream::connect(path).await?;

            Ok(TokioIo::new(stream))
        })
    }
}

/// Plain transport underneath the TLS layer: either TCP or a unix socket.
#[derive(Debug, Clone)]
pub enum InventoryConnector {
    Tcp(HttpConnector),
    Unix(UnixConnector),
}

impl InventoryConnector {
    pub fn tcp() -> Self {
        let mut http = HttpConnector::new();
        // https URIs are handed through to the TLS layer
        http.enforce_http(false);
        Self::Tcp(http)
    }

    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(UnixConnector::new(path))
    }
}

impl Service<Uri> for InventoryConnector {
    type Response = InventoryStream;

    type Error = BoxError;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self {
            Self::Tcp(http) => http.poll_ready(cx).map_err(Into::into),
            Self::Unix(unix) => unix.poll_ready(cx).map_err(Into::into),
        }
    }

    fn call(&mut self, req: Uri) -> Self::Future {
        match self {
            Self::Tcp(http) => {
                let connecting = http.call(req);
                Box::pin(async move { Ok(InventoryStream::Tcp(connecting.await?)) })
            }
            Self::Unix(unix) => {
                let connecting = unix.call(req);
                Box::pin(async move { Ok(InventoryStream::Unix(connecting.await?)) })
            }
        }
    }
}

/// Connection produced by [`InventoryConnector`].
#[derive(Debug)]
pub enum InventoryStream {
    Tcp(TokioIo<TcpStream>),
    Unix(TokioIo<UnixStream>),
}

impl Connection for InventoryStream {
    fn connected(&self) -> Connected {
        match self {
            Self::Tcp(stream) => stream.connected(),
            Self::Unix(_) => Connected::new(),
        }
    }
}

impl Read for InventoryStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl Write for InventoryStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
