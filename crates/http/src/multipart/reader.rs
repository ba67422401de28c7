use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{ready, Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use once_cell::sync::OnceCell;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tracing::{debug, trace, warn};

use crate::codec::{read_header, BufferedReader};
use crate::connection::FormLimits;
use crate::ensure;
use crate::multipart::{FileHeader, MultipartForm};
use crate::protocol::{Header, MultipartError};

/// Bytes looked at in one go when searching for the next delimiter
const PEEK_SIZE: usize = 4096;

/// Longest boundary allowed by RFC 2046
const MAX_BOUNDARY_LEN: usize = 70;

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Splits a multipart body into its parts.
///
/// Only one [`Part`] exists at a time, asking for the next one discards
/// whatever is left of the current one.
#[derive(Debug)]
pub struct MultipartReader<R> {
    reader: BufferedReader<R>,
    /// the underlying stream is exhausted
    eof: bool,
    /// `\r\n--boundary--`, the other delimiters are slices of it
    delimiter: Box<[u8]>,
    part: Option<PartState>,
}

#[derive(Debug)]
struct PartState {
    /// content bytes left once the closing delimiter has been located
    remaining: Option<usize>,
}

impl<R> MultipartReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, boundary: &str) -> Result<Self, MultipartError> {
        ensure!(
            (1..=MAX_BOUNDARY_LEN).contains(&boundary.len()),
            MultipartError::invalid_boundary(format!("length {} not in 1..={MAX_BOUNDARY_LEN}", boundary.len()))
        );

        let delimiter = format!("\r\n--{boundary}--").into_bytes().into_boxed_slice();
        Ok(Self { reader: BufferedReader::with_capacity(reader, PEEK_SIZE), eof: false, delimiter, part: None })
    }

    /// `\r\n--boundary`, what ends the content of a part
    fn crlf_dash_boundary(&self) -> &[u8] {
        &self.delimiter[..self.delimiter.len() - 2]
    }

    /// `--boundary`, the line starting a part
    fn dash_boundary(&self) -> &[u8] {
        &self.delimiter[2..self.delimiter.len() - 2]
    }

    /// `--boundary--`, the line ending the body
    fn dash_boundary_dash(&self) -> &[u8] {
        &self.delimiter[2..]
    }

    /// Advances to the next part, `None` once the closing delimiter was read.
    pub async fn next_part(&mut self) -> Result<Option<Part<'_, R>>, MultipartError> {
        if self.part.is_some() {
            let discarded = tokio::io::copy(&mut PartReader(&mut *self), &mut tokio::io::sink()).await?;
            trace!(discarded, "discarded rest of part");
            self.part = None;

            let crlf = self.reader.read_exact_bytes(2).await?;
            if &crlf[..] != b"\r\n" {
                return Err(MultipartError::MissingCrlf { found: [crlf[0], crlf[1]] });
            }
        }

        // the CRLF after the close delimiter is optional
        let line = self.reader.read_last_line().await.map_err(io::Error::from)?;
        if line[..] == *self.dash_boundary_dash() {
            return Ok(None);
        }
        if line[..] != *self.dash_boundary() {
            return Err(MultipartError::UnexpectedDelimiter {
                expected: String::from_utf8_lossy(self.dash_boundary()).into_owned(),
                found: String::from_utf8_lossy(&line).into_owned(),
            });
        }

        let header = read_header(&mut self.reader).await?;
        self.part = Some(PartState { remaining: None });
        Ok(Some(Part { header, disposition: OnceCell::new(), reader: self }))
    }

    /// Reads content of the current part, stopping in front of the next delimiter.
    fn poll_read_part(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let Some(part) = self.part.as_mut() else {
                return Poll::Ready(Ok(()));
            };

            if let Some(remaining) = part.remaining {
                let len = remaining.min(buf.remaining());
                buf.put_slice(&self.reader.buffer_mut().split_to(len));
                part.remaining = Some(remaining - len);
                return Poll::Ready(Ok(()));
            }

            while !self.eof && self.reader.buffer().len() < PEEK_SIZE {
                if ready!(self.reader.poll_fill(cx))? == 0 {
                    self.eof = true;
                }
            }

            let window = self.reader.buffer();
            let pattern = &self.delimiter[..self.delimiter.len() - 2];
            match find(window, pattern) {
                Some(index) => self.set_remaining(index),
                None if self.eof => {
                    // no delimiter before the end: hand out what is left, the
                    // next `next_part` fails on the missing delimiter
                    debug!(len = window.len(), "multipart body ends without delimiter");
                    let len = window.len();
                    self.set_remaining(len);
                }
                None => {
                    // the tail could be the start of a delimiter split across reads
                    let safe = window.len() + 1 - pattern.len();
                    let len = safe.min(buf.remaining());
                    buf.put_slice(&self.reader.buffer_mut().split_to(len));
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }

    fn set_remaining(&mut self, remaining: usize) {
        if let Some(part) = self.part.as_mut() {
            part.remaining = Some(remaining);
        }
    }

    /// Reads every part into a [`MultipartForm`].
    ///
    /// Parts without a form name are skipped. Values share the
    /// `max_value_memory` budget and fail the whole form once it is exceeded.
    /// Files share the `max_file_memory` budget; a file that does not fit the
    /// rest of it is written to a temp file instead. On error every temp file
    /// created so far is removed.
    pub async fn read_form(&mut self, limits: &FormLimits) -> Result<MultipartForm, MultipartError> {
        let mut form = MultipartForm::default();
        match self.fill_form(&mut form, limits).await {
            Ok(()) => Ok(form),
            Err(e) => {
                form.remove_all().await;
                Err(e)
            }
        }
    }

    async fn fill_form(&mut self, form: &mut MultipartForm, limits: &FormLimits) -> Result<(), MultipartError> {
        let mut value_budget = limits.max_value_memory;
        let mut file_budget = limits.max_file_memory;

        while let Some(mut part) = self.next_part().await? {
            let Some(name) = part.form_name().map(str::to_owned) else {
                continue;
            };

            let mut data = Vec::new();
            let Some(filename) = part.file_name().map(str::to_owned) else {
                let len = (&mut part).take(value_budget.saturating_add(1)).read_to_end(&mut data).await? as u64;
                if len > value_budget {
                    warn!(field = %name, "multipart values exceed memory budget");
                    return Err(MultipartError::MessageTooLarge);
                }
                value_budget -= len;
                form.value.insert(name, String::from_utf8_lossy(&data).into_owned());
                continue;
            };

            let len = (&mut part).take(file_budget.saturating_add(1)).read_to_end(&mut data).await? as u64;
            let header = part.header().clone();
            let file = if len <= file_budget {
                file_budget -= len;
                FileHeader::in_memory(filename, header, Bytes::from(data))
            } else {
                let (path, size) = spool(&data, &mut part, &limits.temp_dir()).await?;
                debug!(field = %name, size, path = %path.display(), "multipart file spilled to disk");
                FileHeader::on_disk(filename, header, size, path)
            };

            if let Some(mut replaced) = form.file.insert(name, file) {
                replaced.remove().await;
            }
        }
        Ok(())
    }
}

/// One part of a multipart body: its header block and, through
/// [`AsyncRead`], its content.
#[derive(Debug)]
pub struct Part<'a, R> {
    header: Header,
    disposition: OnceCell<Disposition>,
    reader: &'a mut MultipartReader<R>,
}

#[derive(Debug, Default)]
struct Disposition {
    form_name: Option<String>,
    file_name: Option<String>,
}

impl<R> Part<'_, R> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The `name` parameter of a `form-data` `Content-Disposition`.
    pub fn form_name(&self) -> Option<&str> {
        self.disposition().form_name.as_deref()
    }

    /// The `filename` parameter of a `form-data` `Content-Disposition`.
    pub fn file_name(&self) -> Option<&str> {
        self.disposition().file_name.as_deref()
    }

    fn disposition(&self) -> &Disposition {
        self.disposition.get_or_init(|| parse_disposition(self.header.get("Content-Disposition").unwrap_or_default()))
    }
}

fn parse_disposition(value: &str) -> Disposition {
    let mut params = value.split(';');
    let mut disposition = Disposition::default();

    if !params.next().is_some_and(|kind| kind.trim().eq_ignore_ascii_case("form-data")) {
        return disposition;
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "name" => disposition.form_name = Some(value.to_string()),
            "filename" => disposition.file_name = Some(value.to_string()),
            _ => {}
        }
    }
    disposition
}

impl<R: AsyncRead + Unpin> AsyncRead for Part<'_, R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.get_mut().reader.poll_read_part(cx, buf)
    }
}

/// Reads the current part without holding a [`Part`].
struct PartReader<'a, R>(&'a mut MultipartReader<R>);

impl<R: AsyncRead + Unpin> AsyncRead for PartReader<'_, R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.get_mut().0.poll_read_part(cx, buf)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Writes `prefix` and the rest of `part` to a new temp file in `dir`.
async fn spool<P>(prefix: &[u8], part: &mut P, dir: &Path) -> Result<(PathBuf, u64), MultipartError>
where
    P: AsyncRead + Unpin,
{
    let (path, mut file) = create_temp_file(dir).await?;

    let written = async {
        file.write_all(prefix).await?;
        let copied = tokio::io::copy(part, &mut file).await?;
        file.flush().await?;
        Ok::<_, io::Error>(prefix.len() as u64 + copied)
    }
    .await;

    match written {
        Ok(size) => Ok((path, size)),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!(cause = %remove_err, path = %path.display(), "failed to remove partial temp file");
            }
            Err(e.into())
        }
    }
}

/// Creates a temp file whose name is unique across processes and connections.
async fn create_temp_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();

    for _ in 0..32 {
        let counter = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!("micro-httpd-multipart-{}-{nanos}-{counter}.tmp", std::process::id()));

        match OpenOptions::new().create_new(true).write(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(io::ErrorKind::AlreadyExists, "could not pick a unique temp file name"))
}
