//! # Deterministic Payload Source
//!
//! Purpose: A seekable, bounded stream of pseudo-random bytes used as PUT
//! request bodies. The storage client may retry a request and rewind the
//! body, so the stream must reproduce the same bytes after any seek; the
//! generator is therefore re-seedable from its construction seed.
//!
//! Bytes are drawn from the PRNG in 8-byte words keyed to the stream
//! position, so the produced byte sequence does not depend on how readers
//! chunk their reads.

use std::hash::Hasher;
use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom};

use fnv::FnvHasher;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Derives a payload seed from the object key and its creation timestamp in
/// milliseconds, so a retried PUT regenerates identical bytes while
/// distinct objects get distinct payloads.
pub fn payload_seed(key: &str, created_ms: u64) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    hasher.write(&created_ms.to_le_bytes());
    hasher.finish()
}

/// Bounded view over a seeded PRNG stream.
pub struct PayloadSource {
    seed: u64,
    len: u64,
    /// Logical read position; may sit past `len` after a seek.
    pos: u64,
    /// How far into the stream the PRNG has been advanced. Always
    /// `min(pos, len)` between calls.
    generated: u64,
    rng: SmallRng,
    word: [u8; 8],
}

impl PayloadSource {
    /// Creates a source of `len` deterministic bytes.
    pub fn new(seed: u64, len: u64) -> Self {
        PayloadSource {
            seed,
            len,
            pos: 0,
            generated: 0,
            rng: SmallRng::seed_from_u64(seed),
            word: [0u8; 8],
        }
    }

    /// Declared stream length, used for content-length headers.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the remaining bytes into one buffer. Convenience for clients
    /// that upload from memory.
    pub fn into_bytes(mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity((self.len - self.pos.min(self.len)) as usize);
        // Reading from a PRNG cannot fail.
        self.read_to_end(&mut buf).expect("payload read");
        buf
    }

    /// Copies stream bytes `[self.generated, self.generated + out.len())`
    /// into `out`, advancing the generator.
    fn produce(&mut self, out: &mut [u8]) {
        let mut copied = 0;
        while copied < out.len() {
            let phase = (self.generated % 8) as usize;
            if phase == 0 {
                self.word = self.rng.next_u64().to_le_bytes();
            }
            let take = (8 - phase).min(out.len() - copied);
            out[copied..copied + take].copy_from_slice(&self.word[phase..phase + take]);
            copied += take;
            self.generated += take as u64;
        }
    }

    /// Advances the generator without keeping the bytes.
    fn discard(&mut self, mut count: u64) {
        let mut scratch = [0u8; 512];
        while count > 0 {
            let take = count.min(scratch.len() as u64) as usize;
            self.produce(&mut scratch[..take]);
            count -= take as u64;
        }
    }

    /// Moves the generator to absolute stream offset `target ≤ len`.
    /// Rewinds restart the PRNG from the construction seed.
    fn reposition(&mut self, target: u64) {
        if target < self.generated {
            self.rng = SmallRng::seed_from_u64(self.seed);
            self.generated = 0;
        }
        let skip = target - self.generated;
        self.discard(skip);
    }
}

impl Read for PayloadSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let want = buf.len().min((self.len - self.pos) as usize);
        self.produce(&mut buf[..want]);
        self.pos += want as u64;
        Ok(want)
    }
}

impl Seek for PayloadSource {
    fn seek(&mut self, target: SeekFrom) -> Result<u64> {
        let abs = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => self.len as i64 + offset,
        };
        if abs < 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        let abs = abs as u64;
        self.reposition(abs.min(self.len));
        self.pos = abs;
        Ok(abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(source: &mut PayloadSource) -> Vec<u8> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn produces_declared_length() {
        let mut source = PayloadSource::new(7, 1000);
        assert_eq!(read_all(&mut source).len(), 1000);
        // Fully drained.
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn rewind_is_idempotent() {
        let mut source = PayloadSource::new(42, 4096);
        let first = read_all(&mut source);
        source.seek(SeekFrom::Start(0)).unwrap();
        let second = read_all(&mut source);
        assert_eq!(first, second);
    }

    #[test]
    fn chunked_reads_match_bulk_read() {
        let bulk = PayloadSource::new(99, 777).into_bytes();

        let mut source = PayloadSource::new(99, 777);
        let mut chunked = Vec::new();
        let mut buf = [0u8; 13];
        loop {
            let n = source.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            chunked.extend_from_slice(&buf[..n]);
        }
        assert_eq!(bulk, chunked);
    }

    #[test]
    fn partial_seek_matches_suffix() {
        let all = PayloadSource::new(5, 256).into_bytes();

        let mut source = PayloadSource::new(5, 256);
        source.seek(SeekFrom::Start(100)).unwrap();
        let tail = read_all(&mut source);
        assert_eq!(tail, &all[100..]);

        // Backward seek re-derives the stream from the seed.
        source.seek(SeekFrom::Start(3)).unwrap();
        let replay = read_all(&mut source);
        assert_eq!(replay, &all[3..]);
    }

    #[test]
    fn seek_past_end_reads_nothing() {
        let mut source = PayloadSource::new(1, 64);
        assert_eq!(source.seek(SeekFrom::End(10)).unwrap(), 74);
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn distinct_seeds_differ() {
        let a = PayloadSource::new(1, 128).into_bytes();
        let b = PayloadSource::new(2, 128).into_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn seed_depends_on_key_and_timestamp() {
        let base = payload_seed("obj000000000001", 1_700_000_000_000);
        assert_eq!(base, payload_seed("obj000000000001", 1_700_000_000_000));
        assert_ne!(base, payload_seed("obj000000000002", 1_700_000_000_000));
        assert_ne!(base, payload_seed("obj000000000001", 1_700_000_000_001));
    }
}
