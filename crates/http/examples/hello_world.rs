use std::sync::Arc;

use async_trait::async_trait;
use micro_httpd::handler::Handler;
use micro_httpd::protocol::{Request, ResponseWriter};
use micro_httpd::server::Server;
use tokio::io::AsyncReadExt;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

struct HelloWorld;

#[async_trait]
impl Handler for HelloWorld {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        info!(method = %request.method(), path = request.path(), "receive request");

        let mut body = Vec::new();
        if let Err(e) = request.body_mut().read_to_end(&mut body).await {
            error!(cause = %e, "read request body failed");
            return;
        }
        info!(body = %String::from_utf8_lossy(&body), "receiving request body");

        if let Err(e) = writer.write_str("Hello World!\r\n").await {
            error!(cause = %e, "write response failed");
        }
    }
}

// curl -v http://127.0.0.1:8080/
// curl -v -H "Transfer-Encoding: chunked" -d "some body" http://127.0.0.1:8080/
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = Server::builder()
        .address("127.0.0.1:8080")
        .expect("valid address")
        .shared_handler(Arc::new(HelloWorld))
        .build()
        .expect("server config");

    if let Err(e) = server.start().await {
        error!(cause = %e, "server stopped");
    }
}
