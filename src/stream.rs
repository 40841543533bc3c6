//! Encrypted positioned I/O over the backing image file.
//!
//! [`ImageStream`] is the only path to the backing file; every component
//! shares one stream handle per container.  Read and write cursors are
//! tracked independently (seek-get and seek-put), mirroring the way folder
//! code interleaves record reads with header writes.
//!
//! Reads pull raw ciphertext into the caller's buffer and XOR the keystream
//! in place; writes XOR a scratch copy and push it out.  The keystream
//! position always equals the absolute file offset, so any byte range can be
//! transformed without touching its neighbours.
//!
//! The transformer is built lazily on the first read or write — key
//! derivation is the expensive step and fires the
//! [`KeyDerivationStart`](crate::event::ProgressEvent::KeyDerivationStart)
//! progress event exactly once.
//!
//! Short reads are an error, not a zero-fill: a seek past the end of a
//! non-sparse image indicates a structural problem and is surfaced.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Instant;

use log::debug;

use crate::error::Result;
use crate::event::{EventSink, ProgressEvent};
use crate::transformer::{build_transformer, ByteTransformer, CipherId, EncryptionProperties};

pub struct ImageStream {
    file:        File,
    get_pos:     u64,
    put_pos:     u64,
    props:       EncryptionProperties,
    transformer: Option<Box<dyn ByteTransformer>>,
    events:      EventSink,
}

impl ImageStream {
    /// Wrap an already-open backing file.  `file`'s OS cursor position is
    /// irrelevant; both logical cursors start at zero.
    pub fn from_file(file: File, props: EncryptionProperties, events: EventSink) -> Self {
        ImageStream {
            file,
            get_pos: 0,
            put_pos: 0,
            props,
            transformer: None,
            events,
        }
    }

    // ── Cursors ──────────────────────────────────────────────────────────────

    #[inline]
    pub fn seek_get(&mut self, pos: u64) {
        self.get_pos = pos;
    }

    #[inline]
    pub fn seek_put(&mut self, pos: u64) {
        self.put_pos = pos;
    }

    #[inline]
    pub fn tell_get(&self) -> u64 {
        self.get_pos
    }

    #[inline]
    pub fn tell_put(&self) -> u64 {
        self.put_pos
    }

    // ── I/O ──────────────────────────────────────────────────────────────────

    /// Read exactly `buf.len()` plaintext bytes at the get cursor.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.get_pos))?;
        self.file.read_exact(buf)?;
        let start = self.get_pos;
        self.apply_keystream(start, buf)?;
        self.get_pos += buf.len() as u64;
        Ok(())
    }

    /// Write `buf` as ciphertext at the put cursor.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut scratch = buf.to_vec();
        let start = self.put_pos;
        self.apply_keystream(start, &mut scratch)?;
        self.file.seek(SeekFrom::Start(self.put_pos))?;
        self.file.write_all(&scratch)?;
        self.put_pos += buf.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Current physical length of the backing file.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ── Keystream ────────────────────────────────────────────────────────────

    fn apply_keystream(&mut self, start: u64, buf: &mut [u8]) -> Result<()> {
        if self.transformer.is_none() {
            self.init_transformer()?;
        }
        if let Some(t) = self.transformer.as_mut() {
            t.transform(start, buf)?;
        }
        Ok(())
    }

    fn init_transformer(&mut self) -> Result<()> {
        let derives = self.props.cipher != CipherId::None;
        if derives {
            self.events.emit(ProgressEvent::KeyDerivationStart);
        }
        let t0 = Instant::now();
        let t = build_transformer(&self.props)?;
        if derives {
            debug!(
                "derived {} key in {:.2?}",
                self.props.cipher.name(),
                t0.elapsed()
            );
            self.events.emit(ProgressEvent::KeyDerivationEnd);
        }
        self.transformer = Some(t);
        Ok(())
    }
}
