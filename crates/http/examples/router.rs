use async_trait::async_trait;
use micro_httpd::handler::Handler;
use micro_httpd::protocol::{Request, ResponseWriter};
use micro_httpd::{router, server};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

/// Answers with the path it was registered for.
struct EchoPattern(&'static str);

#[async_trait]
impl Handler for EchoPattern {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, _request: &mut Request<'_>) {
        if let Err(e) = writer.write_str(self.0).await {
            error!(cause = %e, "write response failed");
        }
    }
}

// curl http://127.0.0.1:8080/foo1/      -> /foo1
// curl http://127.0.0.1:8080/foo1/bar1  -> /foo1/bar1
// curl -v http://127.0.0.1:8080/missing -> 404
#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    router::handle("/foo1", EchoPattern("/foo1"));
    router::handle("/foo2", EchoPattern("/foo2"));
    router::handle("/foo1/bar1", EchoPattern("/foo1/bar1"));

    if let Err(e) = server::listen_and_serve("127.0.0.1:8080", None).await {
        error!(cause = %e, "server stopped");
    }
}
