//! The seam between the connection loop and application code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{Request, ResponseWriter};

/// Serves one request by writing its response.
///
/// The handler runs on the connection's task. The request body and the
/// response writer both borrow the connection, so a handler that wants to
/// keep working after it returns must copy out what it needs.
///
/// Whatever the handler does not read of the body is discarded before the
/// next request, and a panicking handler takes down only its own connection.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        (**self).serve_http(writer, request).await;
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn serve_http(&self, writer: &mut ResponseWriter<'_>, request: &mut Request<'_>) {
        (**self).serve_http(writer, request).await;
    }
}
