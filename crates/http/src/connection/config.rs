//! Tunables of a connection and of the multipart form materializer.

use std::path::PathBuf;

/// Default size of the connection's read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;
/// Default size of the response buffer, which also decides between
/// `Content-Length` and chunked framing
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024;
/// Bytes a request head may occupy before the connection gives up on it
pub const DEFAULT_HEADER_READ_LIMIT: u64 = 1 << 20;

/// Total bytes of non-file form values kept in memory per form
pub const DEFAULT_MAX_VALUE_MEMORY: u64 = 10 << 20;
/// Total bytes of uploaded files kept in memory per form before spilling to disk
pub const DEFAULT_MAX_FILE_MEMORY: u64 = 30 << 20;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub header_read_limit: u64,
    pub form_limits: FormLimits,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            header_read_limit: DEFAULT_HEADER_READ_LIMIT,
            form_limits: FormLimits::default(),
        }
    }
}

/// Memory budgets of [`read_form`](crate::multipart::MultipartReader::read_form).
#[derive(Debug, Clone)]
pub struct FormLimits {
    /// Budget shared by all value fields; exceeding it fails the form.
    pub max_value_memory: u64,
    /// Budget shared by all file fields; a file that does not fit goes to a temp file.
    pub max_file_memory: u64,
    /// Where temp files are created, the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for FormLimits {
    fn default() -> Self {
        Self { max_value_memory: DEFAULT_MAX_VALUE_MEMORY, max_file_memory: DEFAULT_MAX_FILE_MEMORY, temp_dir: None }
    }
}

impl FormLimits {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
