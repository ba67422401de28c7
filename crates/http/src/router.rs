//! Exact-path request routing.
//!
//! A [`Router`] maps request paths to handlers. Lookup is an exact string
//! match on the path (query excluded); a path ending in `/` that has no route
//! of its own falls back to the route without the slash. Anything else gets
//! `404 Not Found` with an empty body.
//!
//! Besides routers built by hand there is one process-wide default router,
//! filled through [`handle`] and used by servers that were not given a handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::StatusCode;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::handler::Handler;
use crate::protocol::{Request, ResponseWriter};

static DEFAULT_ROUTER: Lazy<ArcSwap<Router>> = Lazy::new(|| ArcSwap::from_pointee(Router::new()));

#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `pattern` to `handler`, replacing an earlier route for the same pattern.
    pub fn handle<H>(&mut self, pattern: impl Into<String>, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.insert(pattern.into(), Arc::new(handler));
        self
    }

    fn insert(&mut self, pattern: String, handler: Arc<dyn Handler>) {
        self.routes.insert(pattern, handler);
    }

    /// Finds the handler for `path`, retrying once without a trailing slash.
    pub fn lookup(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(path).or_else(|| {
            let trimmed = path.strip_suffix('/').filter(|trimmed| !trimmed.is_empty())?;
            self.routes.get(trimmed)
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for Router {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        match self.lookup(request.path()) {
            Some(handler) => handler.serve_http(writer, request).await,
            None => {
                debug!(path = request.path(), "no route found");
                writer.write_header(StatusCode::NOT_FOUND);
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("patterns", &self.routes.keys().collect::<Vec<_>>()).finish()
    }
}

/// Routes `pattern` to `handler` on the default router.
///
/// Routes added while a server is running apply from the next request on.
pub fn handle<H>(pattern: impl Into<String>, handler: H)
where
    H: Handler + 'static,
{
    let pattern = pattern.into();
    let handler: Arc<dyn Handler> = Arc::new(handler);
    DEFAULT_ROUTER.rcu(|router| {
        let mut router = Router::clone(router);
        router.insert(pattern.clone(), Arc::clone(&handler));
        router
    });
}

/// A snapshot of the default router.
pub fn default_router() -> Arc<Router> {
    DEFAULT_ROUTER.load_full()
}

/// Serves each request with whatever the default router holds at that moment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouter;

#[async_trait]
impl Handler for DefaultRouter {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        let router = DEFAULT_ROUTER.load_full();
        router.serve_http(writer, request).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_request_header;
    use crate::connection::test_util::{conn_reader, conn_writer};
    use crate::connection::FormLimits;
    use crate::protocol::Body;
    use tokio::io::AsyncReadExt;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn serve_http(&self, writer: &mut ResponseWriter<'_>, _request: &mut Request<'_>) {
            writer.write_str(self.0).await.unwrap();
        }
    }

    async fn route(handler: &dyn Handler, path: &str) -> String {
        let raw: &'static [u8] = Box::leak(format!("GET {path} HTTP/1.1\r\n\r\n").into_bytes().into_boxed_slice());
        let mut reader = conn_reader(raw);
        let (header, payload_size) = read_request_header(&mut reader).await.unwrap();
        let mut request = Request::new(header, Body::new(payload_size, &mut reader), None, FormLimits::default());

        let (conn, mut client) = conn_writer();
        let mut writer = ResponseWriter::new(&conn, "HTTP/1.1", false, 1024);
        handler.serve_http(&mut writer, &mut request).await;
        writer.finish().await.unwrap();
        conn.lock().await.shutdown().await.unwrap();

        let mut sent = String::new();
        client.read_to_string(&mut sent).await.unwrap();
        sent
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.handle("/", Named("root")).handle("/user", Named("user")).handle("/user/", Named("user dir"));
        router.handle("/file", Named("file"));
        router
    }

    #[tokio::test]
    async fn exact_match() {
        let router = router();
        assert!(route(&router, "/user").await.ends_with("\r\n\r\nuser"));
        assert!(route(&router, "/user/").await.ends_with("\r\n\r\nuser dir"));
        assert!(route(&router, "/").await.ends_with("\r\n\r\nroot"));
    }

    #[tokio::test]
    async fn query_is_not_part_of_the_path() {
        let router = router();
        assert!(route(&router, "/file?name=a.txt").await.ends_with("\r\n\r\nfile"));
    }

    #[tokio::test]
    async fn trailing_slash_is_retried_once() {
        let router = router();
        assert!(route(&router, "/file/").await.ends_with("\r\n\r\nfile"));
        assert!(route(&router, "/file//").await.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = router();
        let sent = route(&router, "/missing").await;
        assert_eq!(sent, "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn default_router_sees_later_routes() {
        handle("/late-route", Named("late"));
        assert!(default_router().lookup("/late-route").is_some());
        assert!(route(&DefaultRouter, "/late-route/").await.ends_with("\r\n\r\nlate"));
    }
}
