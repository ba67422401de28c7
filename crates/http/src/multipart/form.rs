use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::protocol::Header;

/// A parsed `multipart/form-data` body.
///
/// Files kept on disk are deleted by [`remove_all`](MultipartForm::remove_all),
/// which the connection runs when the request is finished, or at the latest
/// when the form is dropped.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub(crate) value: HashMap<String, String>,
    pub(crate) file: HashMap<String, FileHeader>,
}

impl MultipartForm {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.value.get(name).map(String::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&FileHeader> {
        self.file.get(name)
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.value
    }

    pub fn files(&self) -> &HashMap<String, FileHeader> {
        &self.file
    }

    /// Deletes every temp file of the form. Files already gone are ignored.
    pub async fn remove_all(&mut self) {
        for file in self.file.values_mut() {
            file.remove().await;
        }
    }
}

/// An uploaded file of a [`MultipartForm`].
#[derive(Debug)]
pub struct FileHeader {
    filename: String,
    header: Header,
    size: u64,
    content: FileContent,
}

/// Where the bytes of an uploaded file live.
#[derive(Debug)]
pub enum FileContent {
    Memory(Bytes),
    /// `None` once the temp file was removed
    Disk(Option<PathBuf>),
}

impl FileHeader {
    pub(crate) fn in_memory(filename: String, header: Header, content: Bytes) -> Self {
        Self { filename, header, size: content.len() as u64, content: FileContent::Memory(content) }
    }

    pub(crate) fn on_disk(filename: String, header: Header, size: u64, path: PathBuf) -> Self {
        Self { filename, header, size, content: FileContent::Disk(Some(path)) }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The header block of the part the file came from.
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.content, FileContent::Disk(_))
    }

    /// The temp file holding the content, if it is on disk and not removed yet.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            FileContent::Disk(path) => path.as_deref(),
            FileContent::Memory(_) => None,
        }
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    /// Opens the content for reading.
    pub async fn open(&self) -> io::Result<Box<dyn AsyncRead + Send + Sync + Unpin>> {
        match &self.content {
            FileContent::Memory(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            FileContent::Disk(Some(path)) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            FileContent::Disk(None) => Err(io::Error::new(io::ErrorKind::NotFound, "temp file already removed")),
        }
    }

    /// Copies the content to `dest`, removing a partially written `dest` on failure.
    pub async fn save(&self, dest: impl AsRef<Path>) -> io::Result<u64> {
        let dest = dest.as_ref();
        let mut reader = self.open().await?;
        let mut file = tokio::fs::File::create(dest).await?;

        let copied = async {
            let copied = tokio::io::copy(&mut reader, &mut file).await?;
            tokio::io::AsyncWriteExt::flush(&mut file).await?;
            Ok::<_, io::Error>(copied)
        }
        .await;

        if copied.is_err() {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(dest).await {
                warn!(cause = %e, dest = %dest.display(), "failed to remove partial file");
            }
        }
        copied
    }

    /// Deletes the temp file, if any, exactly once.
    pub(crate) async fn remove(&mut self) {
        let FileContent::Disk(path) = &mut self.content else {
            return;
        };
        let Some(path) = path.take() else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(cause = %e, path = %path.display(), "failed to remove multipart temp file"),
        }
    }
}

impl Drop for FileHeader {
    fn drop(&mut self) {
        let FileContent::Disk(Some(path)) = &self.content else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "multipart temp file removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(cause = %e, path = %path.display(), "failed to remove multipart temp file on drop"),
        }
    }
}
