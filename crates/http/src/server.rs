//! A TCP server running one [`HttpConnection`] task per accepted stream.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionConfig, HttpConnection};
use crate::handler::Handler;
use crate::protocol::HttpError;
use crate::router::DefaultRouter;

pub struct ServerBuilder {
    address: Option<Vec<SocketAddr>>,
    handler: Option<Arc<dyn Handler>>,
    config: ConnectionConfig,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {source}")]
    InvalidAddress {
        #[from]
        source: io::Error,
    },
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, handler: None, config: ConnectionConfig::default() }
    }

    /// Address to listen on, resolved when the server is built.
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Result<Self, ServerBuildError> {
        self.address = Some(address.to_socket_addrs()?.collect());
        Ok(self)
    }

    /// The handler every request goes to, the default router when unset.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = self.address.filter(|address| !address.is_empty()).ok_or(ServerBuildError::MissingAddress)?;
        let handler = self.handler.unwrap_or_else(|| Arc::new(DefaultRouter));
        Ok(Server { address, handler, config: self.config })
    }
}

pub struct Server {
    address: Vec<SocketAddr>,
    handler: Arc<dyn Handler>,
    config: ConnectionConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the address and serves connections until accepting fails for good.
    pub async fn start(self) -> io::Result<()> {
        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };
        self.serve(tcp_listener).await
    }

    /// Serves connections accepted on an already bound listener.
    ///
    /// A failed accept is logged and skipped; every accepted stream is served
    /// on its own task, so a slow or broken peer never stalls the others.
    pub async fn serve(self, tcp_listener: TcpListener) -> io::Result<()> {
        let handler = self.handler;
        let config = self.config;

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let handler = Arc::clone(&handler);
            let config = config.clone();

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::with_config(reader, writer, config).with_remote_addr(remote_addr);
                match connection.process(handler).await {
                    Ok(()) => {
                        debug!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(HttpError::HandlerPanic { .. }) => {
                        // already reported by the connection
                    }
                    Err(e) => {
                        error!(%remote_addr, cause = %e, "service has error, connection shutdown");
                    }
                }
            });
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("address", &self.address).field("config", &self.config).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("address", &self.address)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Listens on `address` and serves every connection with `handler`, or with
/// the default router when `handler` is `None`.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use micro_httpd::handler::Handler;
/// use micro_httpd::protocol::{Request, ResponseWriter};
///
/// struct Hello;
///
/// #[async_trait]
/// impl Handler for Hello {
///     async fn serve_http(&self, writer: &mut ResponseWriter<'_>, _request: &mut Request<'_>) {
///         let _ = writer.write_str("hello\n").await;
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     micro_httpd::router::handle("/hello", Hello);
///     micro_httpd::server::listen_and_serve("127.0.0.1:8080", None).await?;
///     Ok(())
/// }
/// ```
pub async fn listen_and_serve<A: ToSocketAddrs>(address: A, handler: Option<Arc<dyn Handler>>) -> Result<(), ServeError> {
    let mut builder = Server::builder().address(address)?;
    if let Some(handler) = handler {
        builder = builder.shared_handler(handler);
    }
    builder.build()?.start().await?;
    Ok(())
}

#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Build(#[from] ServerBuildError),
    #[error("serve error: {0}")]
    Io(#[from] io::Error),
}
