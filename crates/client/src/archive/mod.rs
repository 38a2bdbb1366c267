//! Append-only archive of captured responses.
//!
//! Records are appended to numbered container files
//! (`<prefix>-00000.arc`, `<prefix>-00001.arc`, ...) in a single directory.
//! A record is addressed by its container name and byte offset, which the
//! index stores as a [`Locator`].
//!
//! Appends are serialized; reads open their own handle and can run
//! concurrently with appends.

pub mod live;
pub mod record;

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use livecache_core::{Error, Locator, Resource};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

pub use live::LiveArchive;
pub use record::RecordHeader;

const CONTAINER_SUFFIX: &str = ".arc";

/// Container currently receiving appends.
struct Active {
    seq: u32,
    file: Option<File>,
}

/// Directory of archive containers.
pub struct ArchiveDir {
    root: PathBuf,
    prefix: String,
    max_container_bytes: u64,
    active: Mutex<Active>,
}

impl ArchiveDir {
    /// Open (creating if needed) the archive rooted at `root`.
    ///
    /// Appends resume in the highest-numbered existing container for `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Archive` if the directory cannot be created or listed.
    pub async fn open(root: impl AsRef<Path>, prefix: impl Into<String>, max_container_bytes: u64) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let prefix = prefix.into();
        fs::create_dir_all(&root).await?;

        let mut seq = 0;
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(found) = entry.file_name().to_str().and_then(|name| container_seq(&prefix, name)) {
                seq = seq.max(found);
            }
        }

        tracing::debug!(root = %root.display(), prefix = %prefix, seq, "opened archive directory");
        Ok(Self { root, prefix, max_container_bytes, active: Mutex::new(Active { seq, file: None }) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a record and return where it was written.
    ///
    /// The offset is taken from the container's length at write time, so a
    /// previously interrupted append never misaddresses later records.
    ///
    /// # Errors
    ///
    /// Returns `Error::Archive` if the container cannot be opened or written.
    pub async fn append(
        &self, url: &str, captured_at: DateTime<Utc>, status_code: u16, content_type: Option<&str>, body: &[u8],
    ) -> Result<Locator, Error> {
        let header = RecordHeader {
            url: url.to_string(),
            captured_at,
            status_code,
            content_type: content_type.map(String::from),
            length: body.len() as u64,
        };

        let mut active = self.active.lock().await;

        let mut offset = match &active.file {
            Some(file) => file.metadata().await?.len(),
            None => self.container_len(active.seq).await?,
        };
        if offset > 0 && offset >= self.max_container_bytes {
            active.seq += 1;
            active.file = None;
            offset = 0;
            tracing::debug!(container = %self.container_name(active.seq), "rolled over to new container");
        }

        let name = self.container_name(active.seq);
        let file = match &mut active.file {
            Some(file) => file,
            slot => {
                let file = OpenOptions::new().create(true).append(true).open(self.root.join(&name)).await?;
                offset = file.metadata().await?.len();
                slot.insert(file)
            }
        };

        let mut buf = Vec::with_capacity(body.len() + 256);
        buf.extend_from_slice(header.encode().as_bytes());
        buf.extend_from_slice(body);
        buf.push(b'\n');
        file.write_all(&buf).await?;
        file.flush().await?;

        tracing::debug!(container = %name, offset, bytes = body.len(), "appended record");
        Ok(Locator::new(name, offset))
    }

    /// Read the record at `locator`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Archive` if the container name is not a plain file
    /// name, or the record is missing or malformed.
    pub async fn read(&self, locator: &Locator) -> Result<Resource, Error> {
        let name = &locator.container;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Archive(format!("invalid container name: {name}")));
        }

        let mut file = File::open(self.root.join(name))
            .await
            .map_err(|e| Error::Archive(format!("cannot open {name}: {e}")))?;
        file.seek(SeekFrom::Start(locator.offset)).await?;

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::Archive(format!("no record at {locator}")));
        }
        let header = RecordHeader::parse(&line)?;

        // The header length is untrusted; the container bounds the read.
        let mut body = Vec::new();
        (&mut reader).take(header.length).read_to_end(&mut body).await?;
        if body.len() as u64 != header.length {
            return Err(Error::Archive(format!(
                "truncated record at {locator}: header claims {} bytes, found {}",
                header.length,
                body.len()
            )));
        }

        Ok(Resource {
            locator: locator.clone(),
            url: header.url,
            captured_at: header.captured_at,
            status_code: header.status_code,
            content_type: header.content_type,
            body: Bytes::from(body),
        })
    }

    /// Flush and close the active container.
    pub async fn close(&self) -> Result<(), Error> {
        let mut active = self.active.lock().await;
        if let Some(file) = active.file.take() {
            file.sync_all().await?;
            tracing::debug!(container = %self.container_name(active.seq), "closed active container");
        }
        Ok(())
    }

    fn container_name(&self, seq: u32) -> String {
        format!("{}-{seq:05}{CONTAINER_SUFFIX}", self.prefix)
    }

    async fn container_len(&self, seq: u32) -> Result<u64, Error> {
        match fs::metadata(self.root.join(self.container_name(seq))).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sequence number of `name` if it is one of `prefix`'s containers.
fn container_seq(prefix: &str, name: &str) -> Option<u32> {
    name.strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(CONTAINER_SUFFIX)?
        .parse()
        .ok()
}
