use std::collections::VecDeque;

use crate::{
    constants::{FILE_CHUNKS_IN_FLIGHT, FILE_CHUNK_SIZE, MAX_FILE_NAMES},
    files::{error::FileTransferError, file_store::FileStore},
};

struct Download {
    buffer: Vec<u8>,
    size: usize,
}

struct Upload {
    data: Vec<u8>,
    offset: usize,
}

/// Outcome of a received chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The server does not have the current file; it was dropped
    Skipped,
    Progress {
        name: String,
        received: usize,
        size: usize,
    },
    Completed { name: String },
}

/// Outcome of a request to upload a file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStart {
    /// Uploads are switched off
    Refused,
    /// No such file (or an empty one)
    Unavailable,
    Started { size: usize },
}

/// File download state of one connection. A client downloads the files its
/// ghost-always objects need; a server uploads them one at a time.
pub struct FileTransfer {
    missing_files: VecDeque<String>,
    download: Option<Download>,
    downloaded_count: u32,
    upload: Option<Upload>,
}

impl FileTransfer {
    pub fn new() -> Self {
        Self {
            missing_files: VecDeque::new(),
            download: None,
            downloaded_count: 0,
            upload: None,
        }
    }

    // Downloading

    /// Starts a download segment for `names`
    pub fn set_missing_files(&mut self, names: Vec<String>) {
        self.missing_files = names.into();
        self.downloaded_count = 0;
    }

    pub fn missing_files(&self) -> impl Iterator<Item = &String> {
        self.missing_files.iter()
    }

    pub fn downloaded_count(&self) -> u32 {
        self.downloaded_count
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    /// Drops missing files that turned up meanwhile (or that may not be
    /// downloaded) and returns the names to request next, if any remain
    pub fn next_request(&mut self, store: &dyn FileStore, never_download: bool) -> Option<Vec<String>> {
        while let Some(name) = self.missing_files.front() {
            if !never_download && !store.exists(name) {
                break;
            }
            self.missing_files.pop_front();
        }
        if self.missing_files.is_empty() {
            return None;
        }
        Some(
            self.missing_files
                .iter()
                .take(MAX_FILE_NAMES)
                .cloned()
                .collect(),
        )
    }

    pub fn begin_download(&mut self, size: usize) {
        // SECURITY: the size is peer supplied; grow with the data instead
        let capacity = size.min(FILE_CHUNK_SIZE * FILE_CHUNKS_IN_FLIGHT);
        self.download = Some(Download {
            buffer: Vec::with_capacity(capacity),
            size,
        });
    }

    pub fn chunk_received(
        &mut self,
        data: &[u8],
        store: &mut dyn FileStore,
    ) -> Result<ChunkOutcome, FileTransferError> {
        if data.is_empty() {
            self.download = None;
            self.missing_files.pop_front();
            return Ok(ChunkOutcome::Skipped);
        }

        let download = self.download.as_mut().ok_or(FileTransferError::InvalidChunk)?;
        if download.buffer.len() + data.len() > download.size {
            return Err(FileTransferError::InvalidChunk);
        }
        download.buffer.extend_from_slice(data);

        let name = self
            .missing_files
            .front()
            .cloned()
            .ok_or(FileTransferError::InvalidChunk)?;
        if download.buffer.len() < download.size {
            return Ok(ChunkOutcome::Progress {
                name,
                received: download.buffer.len(),
                size: download.size,
            });
        }

        store.write(&name, &download.buffer)?;
        self.missing_files.pop_front();
        self.download = None;
        self.downloaded_count += 1;
        Ok(ChunkOutcome::Completed { name })
    }

    // Uploading

    pub fn start_upload(&mut self, name: &str, store: &dyn FileStore, never_upload: bool) -> UploadStart {
        if never_upload {
            return UploadStart::Refused;
        }
        match store.read(name) {
            Some(data) if !data.is_empty() => {
                let size = data.len();
                self.upload = Some(Upload { data, offset: 0 });
                UploadStart::Started { size }
            }
            _ => UploadStart::Unavailable,
        }
    }

    /// The next chunk of the current upload; None once it is all sent
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        let upload = self.upload.as_mut()?;
        let end = (upload.offset + FILE_CHUNK_SIZE).min(upload.data.len());
        if end == upload.offset {
            self.upload = None;
            return None;
        }
        let chunk = upload.data[upload.offset..end].to_vec();
        upload.offset = end;
        Some(chunk)
    }
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self::new()
    }
}
