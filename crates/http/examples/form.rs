use async_trait::async_trait;
use micro_httpd::handler::Handler;
use micro_httpd::protocol::{FormError, Request, ResponseWriter};
use micro_httpd::router::Router;
use micro_httpd::server::Server;
use tokio::io::AsyncReadExt;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Prints the content of the uploaded `file1`.
// curl -F "file1=@Cargo.toml" http://127.0.0.1:8080/file
struct PrintFile;

#[async_trait]
impl Handler for PrintFile {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        let result: Result<String, FormError> = async {
            let file = request.form_file("file1").await?;
            let mut content = Vec::new();
            file.open().await?.read_to_end(&mut content).await?;
            info!(filename = file.filename(), size = file.size(), on_disk = file.is_on_disk(), "receive file");
            Ok(String::from_utf8_lossy(&content).into_owned())
        }
        .await;
        respond(writer, result).await;
    }
}

/// Saves every uploaded file under the system temp dir.
// curl -F "a=@Cargo.toml" -F "b=@README.md" http://127.0.0.1:8080/save
struct SaveFiles;

#[async_trait]
impl Handler for SaveFiles {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        let result: Result<String, FormError> = async {
            let form = request.multipart_form().await?;
            let mut saved = String::new();
            for (name, file) in form.files() {
                let dest = std::env::temp_dir().join(sanitize(file.filename()));
                let size = file.save(&dest).await?;
                saved.push_str(&format!("{name}: {} bytes saved to {}\n", size, dest.display()));
            }
            Ok(saved)
        }
        .await;
        respond(writer, result).await;
    }
}

/// Echoes the `foo1` and `foo2` form values, urlencoded or multipart.
// curl -d "foo1=hello&foo2=world" http://127.0.0.1:8080/values
struct PrintValues;

#[async_trait]
impl Handler for PrintValues {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        let foo1 = request.post_form("foo1").await.unwrap_or_default().to_string();
        let foo2 = request.post_form("foo2").await.unwrap_or_default().to_string();
        respond(writer, Ok(format!("foo1={foo1},foo2={foo2}\n"))).await;
    }
}

async fn respond(writer: &mut ResponseWriter<'_>, result: Result<String, FormError>) {
    let text = match result {
        Ok(text) => text,
        Err(e) => {
            error!(cause = %e, "handle form failed");
            writer.write_header(if e.is_too_large() {
                http::StatusCode::PAYLOAD_TOO_LARGE
            } else {
                http::StatusCode::BAD_REQUEST
            });
            format!("{e}\n")
        }
    };
    if let Err(e) = writer.write_str(&text).await {
        error!(cause = %e, "write response failed");
    }
}

fn sanitize(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == ".." { "upload.bin".to_string() } else { name.to_string() }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut router = Router::new();
    router.handle("/file", PrintFile).handle("/save", SaveFiles).handle("/values", PrintValues);

    Server::builder().address("127.0.0.1:8080")?.handler(router).build()?.start().await?;
    Ok(())
}
