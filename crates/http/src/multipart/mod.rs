//! `multipart/form-data` bodies ([RFC 2046 §5.1.1](https://datatracker.ietf.org/doc/html/rfc2046#section-5.1.1)).
//!
//! [`MultipartReader`] walks the parts of a body one at a time, each [`Part`]
//! streams its content up to the next delimiter. [`MultipartReader::read_form`]
//! materializes a whole body into a [`MultipartForm`], keeping values in memory
//! and spilling files that do not fit the memory budget to temp files.
//!
//! ```text
//! --boundary
//! Content-Disposition: form-data; name="text1"
//!
//! text default
//! --boundary
//! Content-Disposition: form-data; name="file1"; filename="a.txt"
//! Content-Type: text/plain
//!
//! Content of a.txt.
//! --boundary--
//! ```

mod form;
mod reader;

pub use form::{FileContent, FileHeader, MultipartForm};
pub use reader::{MultipartReader, Part};
