use std::path::PathBuf;

use async_trait::async_trait;
use http::StatusCode;
use micro_httpd::handler::Handler;
use micro_httpd::protocol::{Request, ResponseWriter};
use micro_httpd::server::Server;
use tokio::fs::File;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Serves files below a root directory. Small files go out with a
/// `Content-Length`, larger ones chunked; the content type is sniffed.
struct StaticFiles {
    root: PathBuf,
}

#[async_trait]
impl Handler for StaticFiles {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        let relative = request.path().trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            writer.write_header(StatusCode::FORBIDDEN);
            return;
        }
        let path = if relative.is_empty() { self.root.join("index.html") } else { self.root.join(relative) };

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), cause = %e, "open file failed");
                writer.write_header(StatusCode::NOT_FOUND);
                return;
            }
        };

        match writer.copy_from(&mut file).await {
            Ok(size) => info!(path = %path.display(), size, "served file"),
            Err(e) => error!(path = %path.display(), cause = %e, "send file failed"),
        }
    }
}

// cargo run --example static_file -- ./public
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let root = std::env::args().nth(1).map_or_else(|| PathBuf::from("."), PathBuf::from);
    let server = Server::builder()
        .address("127.0.0.1:8080")
        .expect("valid address")
        .handler(StaticFiles { root })
        .build()
        .expect("server config");

    if let Err(e) = server.start().await {
        error!(cause = %e, "server stopped");
    }
}
