//! On-the-fly ZIP archives of remote files.
//!
//! Entries use data descriptors, so nothing about a file has to be known
//! before its bytes are read. The local header carries zero sizes, and the
//! CRC and sizes follow the deflated data. The central directory is written
//! once the last file is done.
//!
//! ```text
//! upstream ──► deflate + crc32 ──► ArchiveEncoder ──► mpsc ──► body
//! ```
//!
//! The encoder runs in an async task and hands chunks to a bounded channel
//! that the response body drains. A slow receiver parks the task on `send`
//! without holding a thread; a receiver that disconnects closes the channel
//! and the task stops fetching.

use std::io::{self, Write};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::blob::{BlobStore, BlobStream, ByteStream};
use crate::error::{Error, Result};
use crate::registry::FileRef;

/// Bytes collected before a chunk is handed to the channel.
const CHUNK_SIZE: usize = 64 * 1024;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const ZIP64_END_SIG: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
const END_SIG: u32 = 0x0605_4b50;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
/// Bit 3: sizes follow the data. Bit 11: names are UTF-8.
const FLAGS: u16 = 0x0808;
const METHOD_DEFLATE: u16 = 8;
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Entries announced at or above this size are written as zip64, leaving
/// room for deflate overhead on incompressible data.
const ZIP64_THRESHOLD: u64 = 0xFFF0_0000;

/// Settings for archive output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Deflate level, 0 to 9
    pub compression_level: i64,
    /// Chunks buffered between the encoder and the receiver
    pub channel_capacity: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression_level: 9,
            channel_capacity: 16,
        }
    }
}

/// Central directory record of a finished entry.
struct CentralRecord {
    name: String,
    crc: u32,
    compressed: u64,
    uncompressed: u64,
    offset: u64,
    zip64: bool,
}

/// Entry whose data is being written.
struct OpenEntry {
    name: String,
    offset: u64,
    zip64: bool,
    crc: crc32fast::Hasher,
    deflate: DeflateEncoder<Vec<u8>>,
    compressed: u64,
    uncompressed: u64,
}

/// Streaming ZIP encoder.
///
/// Output accumulates in an internal buffer that the caller drains with
/// [`take`](Self::take). Entry names are written as given; repeated names
/// produce separate entries.
pub(crate) struct ArchiveEncoder {
    level: Compression,
    dos_time: u16,
    dos_date: u16,
    out: BytesMut,
    drained: u64,
    entries: Vec<CentralRecord>,
    current: Option<OpenEntry>,
}

impl ArchiveEncoder {
    /// Create an encoder stamping every entry with `modified`.
    pub(crate) fn new(compression_level: i64, modified: DateTime<Utc>) -> Self {
        let level = u32::try_from(compression_level.clamp(0, 9)).unwrap_or(9);
        let (dos_time, dos_date) = dos_timestamp(modified);
        Self {
            level: Compression::new(level),
            dos_time,
            dos_date,
            out: BytesMut::with_capacity(CHUNK_SIZE),
            drained: 0,
            entries: Vec::new(),
            current: None,
        }
    }

    /// Bytes produced so far, drained or not.
    fn position(&self) -> u64 {
        self.drained + self.out.len() as u64
    }

    /// Bytes waiting to be taken.
    pub(crate) fn buffered(&self) -> usize {
        self.out.len()
    }

    /// Take everything produced since the last call.
    pub(crate) fn take(&mut self) -> Bytes {
        let chunk = self.out.split().freeze();
        self.drained += chunk.len() as u64;
        chunk
    }

    /// Write the local header of a new entry.
    ///
    /// `size_hint` is the expected uncompressed length; unknown or large
    /// entries get zip64 sizes.
    pub(crate) fn start_entry(&mut self, name: &str, size_hint: Option<u64>) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::Archive("previous entry is still open".into()));
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| Error::Archive(format!("entry name too long: {name}")))?;
        let zip64 = size_hint.is_none_or(|len| len >= ZIP64_THRESHOLD);
        let offset = self.position();

        let out = &mut self.out;
        out.put_u32_le(LOCAL_HEADER_SIG);
        out.put_u16_le(if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT });
        out.put_u16_le(FLAGS);
        out.put_u16_le(METHOD_DEFLATE);
        out.put_u16_le(self.dos_time);
        out.put_u16_le(self.dos_date);
        out.put_u32_le(0);
        let size_field = if zip64 { u32::MAX } else { 0 };
        out.put_u32_le(size_field);
        out.put_u32_le(size_field);
        out.put_u16_le(name_len);
        out.put_u16_le(if zip64 { 20 } else { 0 });
        out.put_slice(name.as_bytes());
        if zip64 {
            out.put_u16_le(ZIP64_EXTRA_ID);
            out.put_u16_le(16);
            out.put_u64_le(0);
            out.put_u64_le(0);
        }

        self.current = Some(OpenEntry {
            name: name.to_string(),
            offset,
            zip64,
            crc: crc32fast::Hasher::new(),
            deflate: DeflateEncoder::new(Vec::new(), self.level),
            compressed: 0,
            uncompressed: 0,
        });
        Ok(())
    }

    /// Compress `data` into the open entry.
    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| Error::Archive("no entry is open".into()))?;
        entry.crc.update(data);
        entry.uncompressed += data.len() as u64;
        entry.deflate.write_all(data)?;

        let produced = std::mem::take(entry.deflate.get_mut());
        entry.compressed += produced.len() as u64;
        self.out.extend_from_slice(&produced);
        Ok(())
    }

    /// Flush the open entry and write its data descriptor.
    pub(crate) fn finish_entry(&mut self) -> Result<()> {
        let entry = self
            .current
            .take()
            .ok_or_else(|| Error::Archive("no entry is open".into()))?;

        let tail = entry.deflate.finish()?;
        let compressed = entry.compressed + tail.len() as u64;
        self.out.extend_from_slice(&tail);

        let limit = u64::from(u32::MAX);
        if !entry.zip64 && (compressed >= limit || entry.uncompressed >= limit) {
            return Err(Error::Archive(format!(
                "{} is larger than its announced size",
                entry.name
            )));
        }

        let crc = entry.crc.finalize();
        self.out.put_u32_le(DATA_DESCRIPTOR_SIG);
        self.out.put_u32_le(crc);
        if entry.zip64 {
            self.out.put_u64_le(compressed);
            self.out.put_u64_le(entry.uncompressed);
        } else {
            self.out.put_u32_le(saturate_u32(compressed));
            self.out.put_u32_le(saturate_u32(entry.uncompressed));
        }

        self.entries.push(CentralRecord {
            name: entry.name,
            crc,
            compressed,
            uncompressed: entry.uncompressed,
            offset: entry.offset,
            zip64: entry.zip64,
        });
        Ok(())
    }

    /// Write the central directory and end records.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::Archive("last entry is still open".into()));
        }

        let directory_offset = self.position();
        for record in &self.entries {
            let mut extra = [0u64; 3];
            let mut extra_count: u16 = 0;
            let mut field = |value: u64| match u32::try_from(value) {
                Ok(narrow) if narrow != u32::MAX => narrow,
                _ => {
                    extra[usize::from(extra_count)] = value;
                    extra_count += 1;
                    u32::MAX
                }
            };
            let uncompressed = field(record.uncompressed);
            let compressed = field(record.compressed);
            let offset = field(record.offset);
            let version = if record.zip64 || extra_count > 0 {
                VERSION_ZIP64
            } else {
                VERSION_DEFAULT
            };

            let out = &mut self.out;
            out.put_u32_le(CENTRAL_HEADER_SIG);
            out.put_u16_le(VERSION_ZIP64);
            out.put_u16_le(version);
            out.put_u16_le(FLAGS);
            out.put_u16_le(METHOD_DEFLATE);
            out.put_u16_le(self.dos_time);
            out.put_u16_le(self.dos_date);
            out.put_u32_le(record.crc);
            out.put_u32_le(compressed);
            out.put_u32_le(uncompressed);
            // Checked against u16 when the entry was started.
            out.put_u16_le(u16::try_from(record.name.len()).unwrap_or(u16::MAX));
            out.put_u16_le(if extra_count == 0 { 0 } else { 4 + 8 * extra_count });
            out.put_u16_le(0);
            out.put_u16_le(0);
            out.put_u16_le(0);
            out.put_u32_le(0);
            out.put_u32_le(offset);
            out.put_slice(record.name.as_bytes());
            if extra_count > 0 {
                out.put_u16_le(ZIP64_EXTRA_ID);
                out.put_u16_le(8 * extra_count);
                for value in &extra[..usize::from(extra_count)] {
                    out.put_u64_le(*value);
                }
            }
        }

        let directory_size = self.position() - directory_offset;
        let count = self.entries.len() as u64;
        let limit = u64::from(u32::MAX);
        let needs_zip64 = count >= u64::from(u16::MAX)
            || directory_size >= limit
            || directory_offset >= limit;

        if needs_zip64 {
            let zip64_end_offset = self.position();
            let out = &mut self.out;
            out.put_u32_le(ZIP64_END_SIG);
            out.put_u64_le(44);
            out.put_u16_le(VERSION_ZIP64);
            out.put_u16_le(VERSION_ZIP64);
            out.put_u32_le(0);
            out.put_u32_le(0);
            out.put_u64_le(count);
            out.put_u64_le(count);
            out.put_u64_le(directory_size);
            out.put_u64_le(directory_offset);

            out.put_u32_le(ZIP64_LOCATOR_SIG);
            out.put_u32_le(0);
            out.put_u64_le(zip64_end_offset);
            out.put_u32_le(1);
        }

        let count16 = u16::try_from(count).unwrap_or(u16::MAX);
        let out = &mut self.out;
        out.put_u32_le(END_SIG);
        out.put_u16_le(0);
        out.put_u16_le(0);
        out.put_u16_le(count16);
        out.put_u16_le(count16);
        out.put_u32_le(saturate_u32(directory_size));
        out.put_u32_le(saturate_u32(directory_offset));
        out.put_u16_le(0);
        Ok(())
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// MS-DOS `(time, date)` of `at`. Dates before 1980 clamp to 1980.
fn dos_timestamp(at: DateTime<Utc>) -> (u16, u16) {
    let year = u32::try_from(at.year() - 1980).unwrap_or(0).min(127);
    let date = (year << 9) | (at.month() << 5) | at.day();
    let time = (at.hour() << 11) | (at.minute() << 5) | (at.second() / 2);
    (
        u16::try_from(time).unwrap_or_default(),
        u16::try_from(date).unwrap_or_default(),
    )
}

/// Start streaming an archive of `files`.
///
/// `first` is the already opened stream of `files[0]`; opening it up front
/// lets the caller report that failure before any output exists. Any later
/// failure ends the returned stream with an error instead of a truncated
/// archive.
pub(crate) fn stream_archive(
    label: String,
    store: Arc<dyn BlobStore>,
    files: Vec<FileRef>,
    first: BlobStream,
    modified: DateTime<Utc>,
    options: ArchiveOptions,
) -> ByteStream {
    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));

    tokio::spawn(async move {
        let mut encoder = ArchiveEncoder::new(options.compression_level, modified);
        match write_archive(&tx, store.as_ref(), &files, first, &mut encoder).await {
            Ok(()) => tracing::info!("Archive {} complete ({} files)", label, files.len()),
            Err(_) if tx.is_closed() => {
                tracing::info!("Receiver of {} disconnected, archive abandoned", label);
            }
            Err(e) => {
                tracing::error!("Archive {} aborted: {}", label, e);
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}

async fn write_archive(
    tx: &mpsc::Sender<io::Result<Bytes>>,
    store: &dyn BlobStore,
    files: &[FileRef],
    first: BlobStream,
    encoder: &mut ArchiveEncoder,
) -> Result<()> {
    let mut first = Some(first);
    for (index, file) in files.iter().enumerate() {
        let mut blob = match first.take() {
            Some(blob) => blob,
            None => store.open(&file.remote_url).await?,
        };
        tracing::debug!(
            "Archiving file {} of {}: {}",
            index + 1,
            files.len(),
            file.display_name
        );

        encoder.start_entry(&file.display_name, blob.content_length)?;
        while let Some(chunk) = blob.body.next().await {
            let chunk = chunk.map_err(|e| Error::upstream_fetch(&file.remote_url, e))?;
            encoder.write(&chunk)?;
            if encoder.buffered() >= CHUNK_SIZE {
                send(tx, encoder.take()).await?;
            }
        }
        encoder.finish_entry()?;
    }

    encoder.finish()?;
    send(tx, encoder.take()).await
}

async fn send(tx: &mpsc::Sender<io::Result<Bytes>>, chunk: Bytes) -> Result<()> {
    if chunk.is_empty() {
        return Ok(());
    }
    tx.send(Ok(chunk))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver disconnected").into())
}
