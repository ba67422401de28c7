//! HTTP request handling implementation.
//!
//! [`RequestHeader`] is what the head decoder produces: method, target,
//! protocol and header fields. [`Request`] adds the body and the views a
//! handler derives from them, each computed on first access: the query map,
//! the cookie map and the submitted form.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use http::{Method, Uri};
use once_cell::sync::OnceCell;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::connection::FormLimits;
use crate::multipart::{FileHeader, MultipartForm, MultipartReader};
use crate::protocol::{Body, FormError, Header};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// The parsed head of an HTTP request.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    method: Method,
    uri: Uri,
    request_uri: String,
    proto: String,
    version: (u8, u8),
    header: Header,
}

impl RequestHeader {
    pub fn new(method: Method, uri: Uri, request_uri: String, proto: String, version: (u8, u8), header: Header) -> Self {
        Self { method, uri, request_uri, proto, version, header }
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request target exactly as it appeared in the request line.
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// The protocol token of the request line, such as `HTTP/1.1`.
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// `(major, minor)` of the protocol version.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Only POST and PUT requests may carry a body.
    pub fn need_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT)
    }

    /// The client sent `Expect: 100-continue` and waits before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.header.get_ignore_ascii_case("Expect").is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// The connection has to be closed after answering this request: the
    /// client speaks HTTP/1.0 or lower, or asked for it with `Connection: close`.
    pub fn wants_close(&self) -> bool {
        self.version < (1, 1)
            || self
                .header
                .get_ignore_ascii_case("Connection")
                .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")))
    }
}

/// A request handed to a [`Handler`](crate::handler::Handler).
///
/// The body is read through [`body_mut`](Request::body_mut), or consumed by
/// the form accessors; whatever is left when the handler returns is
/// discarded by the connection.
pub struct Request<'c> {
    header: RequestHeader,
    body: Body<'c>,
    remote_addr: Option<SocketAddr>,
    content_type: Option<String>,
    boundary: Option<String>,
    form_limits: FormLimits,

    query: OnceCell<HashMap<String, String>>,
    cookies: OnceCell<HashMap<String, String>>,

    form: Option<Result<(), FormError>>,
    post_form: HashMap<String, String>,
    multipart_form: Option<MultipartForm>,
}

impl<'c> Request<'c> {
    pub(crate) fn new(header: RequestHeader, body: Body<'c>, remote_addr: Option<SocketAddr>, form_limits: FormLimits) -> Self {
        let (content_type, boundary) = parse_content_type(header.header().get_ignore_ascii_case("Content-Type"));
        Self {
            header,
            body,
            remote_addr,
            content_type,
            boundary,
            form_limits,
            query: OnceCell::new(),
            cookies: OnceCell::new(),
            form: None,
            post_form: HashMap::new(),
            multipart_form: None,
        }
    }

    pub fn head(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn path(&self) -> &str {
        self.header.uri().path()
    }

    pub fn request_uri(&self) -> &str {
        self.header.request_uri()
    }

    pub fn proto(&self) -> &str {
        self.header.proto()
    }

    pub fn header(&self) -> &Header {
        self.header.header()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn body_mut(&mut self) -> &mut Body<'c> {
        &mut self.body
    }

    /// The media type of `Content-Type` without its parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `boundary` parameter of `Content-Type`, unquoted.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// A value of the query string.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_map().get(name).map(String::as_str)
    }

    pub fn query_map(&self) -> &HashMap<String, String> {
        self.query.get_or_init(|| parse_query(self.uri().query().unwrap_or_default()))
    }

    /// A cookie sent in the `Cookie` header fields.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| parse_cookies(self.header().get_all("Cookie")))
    }

    /// A field of a submitted form, urlencoded or multipart.
    ///
    /// Reads the body on first use. A form that failed to parse has no fields;
    /// the error itself is available from [`multipart_form`](Request::multipart_form).
    pub async fn post_form(&mut self, name: &str) -> Option<&str> {
        self.parse_form().await.ok()?;
        match &self.multipart_form {
            Some(form) => form.value(name),
            None => self.post_form.get(name).map(String::as_str),
        }
    }

    /// The submitted `multipart/form-data` form.
    ///
    /// The outcome of the first parse is kept: later calls return the same form
    /// or the same error without touching the body again.
    pub async fn multipart_form(&mut self) -> Result<&MultipartForm, FormError> {
        self.parse_form().await?;
        self.multipart_form
            .as_ref()
            .ok_or_else(|| FormError::UnsupportedContentType(self.content_type.clone().unwrap_or_default()))
    }

    /// An uploaded file of the submitted multipart form.
    pub async fn form_file(&mut self, name: &str) -> Result<&FileHeader, FormError> {
        self.multipart_form().await?.file(name).ok_or_else(|| FormError::MissingFile(name.to_string()))
    }

    /// Streams the parts of a multipart body instead of materializing them.
    pub fn multipart_reader(&mut self) -> Result<MultipartReader<&mut Body<'c>>, FormError> {
        let boundary = self.boundary.as_deref().ok_or(FormError::MissingBoundary)?;
        Ok(MultipartReader::new(&mut self.body, boundary)?)
    }

    async fn parse_form(&mut self) -> Result<(), FormError> {
        if let Some(result) = &self.form {
            return result.clone();
        }

        let result = self.read_form().await;
        if let Err(e) = &result {
            debug!(cause = %e, "failed to parse form");
        }
        self.form = Some(result.clone());
        result
    }

    async fn read_form(&mut self) -> Result<(), FormError> {
        if !self.header.need_body() {
            return Err(FormError::MissingFormBody);
        }

        match self.content_type.as_deref() {
            Some(FORM_URLENCODED) => {
                let limit = self.form_limits.max_value_memory;
                let mut data = Vec::new();
                let len = (&mut self.body).take(limit.saturating_add(1)).read_to_end(&mut data).await? as u64;
                if len > limit {
                    return Err(FormError::BodyTooLarge { limit });
                }
                self.post_form = parse_query(&String::from_utf8_lossy(&data));
                Ok(())
            }
            Some(MULTIPART_FORM_DATA) => {
                let boundary = self.boundary.as_deref().ok_or(FormError::MissingBoundary)?;
                let mut reader = MultipartReader::new(&mut self.body, boundary)?;
                let form = reader.read_form(&self.form_limits).await?;
                self.multipart_form = Some(form);
                Ok(())
            }
            other => Err(FormError::UnsupportedContentType(other.unwrap_or_default().to_string())),
        }
    }

    /// Discards what is left of the body, then deletes the temp files of a
    /// parsed multipart form. The temp files are deleted even if the body fails.
    pub(crate) async fn finish(&mut self) -> std::io::Result<u64> {
        let drained = self.body.drain().await;
        if let Some(form) = &mut self.multipart_form {
            form.remove_all().await;
        }
        drained
    }

    /// Deletes temp files without touching the body.
    pub(crate) async fn discard_form(&mut self) {
        if let Some(form) = &mut self.multipart_form {
            form.remove_all().await;
        }
    }

    pub(crate) fn body(&self) -> &Body<'c> {
        &self.body
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("header", &self.header)
            .field("remote_addr", &self.remote_addr)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Parses `a=1&b=2` into a map. The first `=` splits key from value, both
/// trimmed; entries without `=` or with nothing after it are dropped.
/// No percent-decoding is applied.
pub(crate) fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            if value.is_empty() {
                return None;
            }
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_cookies(lines: &[String]) -> HashMap<String, String> {
    lines
        .iter()
        .flat_map(|line| line.trim().split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Splits `Content-Type` into the bare media type and its `boundary` parameter.
fn parse_content_type(value: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(value) = value else {
        return (None, None);
    };

    let mut params = value.split(';');
    let content_type = params.next().map(str::trim).filter(|ct| !ct.is_empty()).map(str::to_string);
    let boundary = params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty());

    (content_type, boundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_request_header;
    use crate::connection::test_util::conn_reader;
    use crate::connection::ConnReader;
    use tokio::io::AsyncReadExt;

    async fn request<'c>(reader: &'c mut ConnReader) -> Request<'c> {
        let (header, payload_size) = read_request_header(reader).await.unwrap();
        let body = Body::new(payload_size, reader);
        Request::new(header, body, None, FormLimits::default())
    }

    #[test]
    fn query_drops_incomplete_entries() {
        let query = parse_query("a=1&b=2&bad&c=");
        assert_eq!(query.len(), 2);
        assert_eq!(query["a"], "1");
        assert_eq!(query["b"], "2");

        let query = parse_query(" x = 1 &y==2");
        assert_eq!(query["x"], "1");
        assert_eq!(query["y"], "=2");
    }

    #[test]
    fn cookies_are_trimmed() {
        let cookies = parse_cookies(&["foo=bar; baz = qux".to_string(), "last=1;".to_string()]);
        assert_eq!(cookies["foo"], "bar");
        assert_eq!(cookies["baz"], "qux");
        assert_eq!(cookies["last"], "1");
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn content_type_and_boundary() {
        assert_eq!(
            parse_content_type(Some(r#"multipart/form-data; boundary="----abc""#)),
            (Some("multipart/form-data".to_string()), Some("----abc".to_string()))
        );
        assert_eq!(
            parse_content_type(Some("application/x-www-form-urlencoded; charset=utf-8")),
            (Some(FORM_URLENCODED.to_string()), None)
        );
        assert_eq!(parse_content_type(None), (None, None));
    }

    #[test]
    fn close_rules() {
        let head = |proto: &str, version, connection: Option<&str>| {
            let mut header = Header::new();
            if let Some(connection) = connection {
                header.set("Connection", connection);
            }
            RequestHeader::new(Method::GET, Uri::from_static("/"), "/".into(), proto.into(), version, header)
        };

        assert!(head("HTTP/1.0", (1, 0), None).wants_close());
        assert!(head("HTTP/0.9", (0, 9), None).wants_close());
        assert!(head("HTTP/1.1", (1, 1), Some("close")).wants_close());
        assert!(head("HTTP/1.1", (1, 1), Some("Keep-Alive, Close")).wants_close());
        assert!(!head("HTTP/1.1", (1, 1), None).wants_close());
        assert!(!head("HTTP/1.1", (1, 1), Some("keep-alive")).wants_close());
    }

    #[tokio::test]
    async fn lazy_views() {
        let mut reader = conn_reader(b"GET /search?q=rust&page=2 HTTP/1.1\r\nCookie: session=abc\r\n\r\n");
        let request = request(&mut reader).await;

        assert_eq!(request.path(), "/search");
        assert_eq!(request.request_uri(), "/search?q=rust&page=2");
        assert_eq!(request.query("q"), Some("rust"));
        assert_eq!(request.query("page"), Some("2"));
        assert_eq!(request.query("missing"), None);
        assert_eq!(request.cookie("session"), Some("abc"));
    }

    #[tokio::test]
    async fn urlencoded_form() {
        let mut reader = conn_reader(
            b"POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 22\r\n\r\nuser=ann&password=1234",
        );
        let mut request = request(&mut reader).await;

        assert_eq!(request.post_form("user").await, Some("ann"));
        assert_eq!(request.post_form("password").await, Some("1234"));
        assert!(matches!(request.multipart_form().await, Err(FormError::UnsupportedContentType(_))));
    }

    #[tokio::test]
    async fn form_on_get_is_missing() {
        let mut reader = conn_reader(b"GET / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\n");
        let mut request = request(&mut reader).await;

        assert_eq!(request.post_form("a").await, None);
        assert!(matches!(request.multipart_form().await, Err(FormError::MissingFormBody)));
    }

    #[tokio::test]
    async fn multipart_form_and_cleanup() {
        let body = "--xyz\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n\
                    --xyz\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"doc.txt\"\r\n\r\ncontent\r\n\
                    --xyz--\r\n";
        let raw = format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=xyz\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let raw: &'static [u8] = Box::leak(raw.into_bytes().into_boxed_slice());
        let mut reader = conn_reader(raw);
        let mut request = request(&mut reader).await;

        assert_eq!(request.boundary(), Some("xyz"));
        assert_eq!(request.post_form("title").await, Some("hello"));

        let file = request.form_file("doc").await.unwrap();
        assert_eq!(file.filename(), "doc.txt");
        let mut content = String::new();
        file.open().await.unwrap().read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "content");

        assert!(matches!(request.form_file("other").await, Err(FormError::MissingFile(_))));
        assert_eq!(request.finish().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn form_error_is_memoized() {
        let mut reader = conn_reader(
            b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=b\r\nContent-Length: 7\r\n\r\ngarbage",
        );
        let mut request = request(&mut reader).await;

        let first = request.multipart_form().await.unwrap_err();
        assert!(matches!(first, FormError::Multipart(_)));
        let second = request.multipart_form().await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }
}
