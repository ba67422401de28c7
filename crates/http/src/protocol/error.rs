use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("handler panicked: {message}")]
    HandlerPanic { message: String },
}

impl HttpError {
    pub fn handler_panic<S: ToString>(message: S) -> Self {
        Self::HandlerPanic { message: message.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header read quota of {max_size} bytes exhausted")]
    TooLargeHeader { max_size: u64 },

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(max_size: u64) -> Self {
        Self::TooLargeHeader { max_size }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The peer went away between two requests; not worth reporting.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<ParseError> for io::Error {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => source,
            ParseError::ConnectionClosed => io::Error::from(io::ErrorKind::UnexpectedEof),
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

impl From<SendError> for io::Error {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => source,
            e => io::Error::other(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("invalid boundary: {reason}")]
    InvalidBoundary { reason: String },

    #[error("want delimiter {expected}, but got {found}")]
    UnexpectedDelimiter { expected: String, found: String },

    #[error("expect crlf after part, but got {found:?}")]
    MissingCrlf { found: [u8; 2] },

    #[error("invalid part header: {source}")]
    InvalidPartHeader {
        #[from]
        source: ParseError,
    },

    #[error("multipart: message too large")]
    MessageTooLarge,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl MultipartError {
    pub fn invalid_boundary<S: ToString>(str: S) -> Self {
        Self::InvalidBoundary { reason: str.to_string() }
    }
}

/// Error of a form parse, kept on the request and handed out again on every
/// later access, hence cloneable.
#[derive(Error, Debug, Clone)]
pub enum FormError {
    #[error("missing form body")]
    MissingFormBody,

    #[error("unsupported form type: {0:?}")]
    UnsupportedContentType(String),

    #[error("no boundary detected")]
    MissingBoundary,

    #[error("missing multipart file: {0}")]
    MissingFile(String),

    #[error("form body larger than {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error(transparent)]
    Multipart(Arc<MultipartError>),

    #[error(transparent)]
    Io(Arc<io::Error>),
}

impl From<MultipartError> for FormError {
    fn from(e: MultipartError) -> Self {
        Self::Multipart(Arc::new(e))
    }
}

impl From<io::Error> for FormError {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl FormError {
    /// True when the form was refused for exceeding its memory budget.
    pub fn is_too_large(&self) -> bool {
        match self {
            Self::BodyTooLarge { .. } => true,
            Self::Multipart(e) => matches!(**e, MultipartError::MessageTooLarge),
            _ => false,
        }
    }
}
