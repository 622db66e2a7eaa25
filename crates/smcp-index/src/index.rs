//! Flat (brute-force) inner-product index over unit vectors, keyed by u64 id.
//!
//! On-disk layout, all integers little-endian:
//!
//! ```text
//! magic      8 bytes  "SMCPVIX1"
//! dimension  u32
//! count      u64
//! records    count x (id: u64, vector: dimension x f32)
//! checksum   32 bytes SHA-256 of everything above
//! ```

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use smcp_core::{Result, SmcpError, VectorError};

use crate::embedder::dot;
use crate::persist::write_atomic;

const MAGIC: &[u8; 8] = b"SMCPVIX1";
const HEADER_LEN: usize = 8 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

/// Owned nearest-neighbour structure.
///
/// `add` never deduplicates: adding an id that is already present stores a
/// second vector under it. Callers replacing a vector remove it first.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    ids: Vec<u64>,
    /// Row-major, `ids.len() * dimension` components.
    data: Vec<f32>,
}

impl VectorIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Stored ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }

    /// Append vectors under the given ids.
    ///
    /// Validates the whole batch before mutating, so a failed call leaves the
    /// index unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError`] on length or dimension mismatch.
    pub fn add(&mut self, ids: &[u64], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(VectorError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            }
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            }
            .into());
        }
        self.ids.reserve(ids.len());
        self.data.reserve(ids.len() * self.dimension);
        for (id, vector) in ids.iter().zip(vectors) {
            self.ids.push(*id);
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Remove every vector stored under any of `ids`. Missing ids are ignored.
    ///
    /// Returns the number of vectors removed.
    pub fn remove(&mut self, ids: &[u64]) -> usize {
        if ids.is_empty() || self.ids.is_empty() {
            return 0;
        }
        let dim = self.dimension;
        let mut kept_ids = Vec::with_capacity(self.ids.len());
        let mut kept_data = Vec::with_capacity(self.data.len());
        for (row, id) in self.ids.iter().enumerate() {
            if ids.contains(id) {
                continue;
            }
            kept_ids.push(*id);
            kept_data.extend_from_slice(&self.data[row * dim..(row + 1) * dim]);
        }
        let removed = self.ids.len() - kept_ids.len();
        self.ids = kept_ids;
        self.data = kept_data;
        removed
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.data.clear();
    }

    /// Top `k` `(id, score)` pairs by inner product, highest first.
    ///
    /// Equal scores keep insertion order, so results are stable per call.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::DimensionMismatch`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u64, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, id)| (*id, dot(query, self.row(row))))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dimension..(row + 1) * self.dimension]
    }

    /// Serialize into the checksummed on-disk layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let record_len = 8 + self.dimension * 4;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.ids.len() * record_len + CHECKSUM_LEN);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(self.ids.len() as u64).to_le_bytes());
        for (row, id) in self.ids.iter().enumerate() {
            buf.extend_from_slice(&id.to_le_bytes());
            for value in self.row(row) {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        let checksum = Sha256::digest(&buf);
        buf.extend_from_slice(&checksum);
        buf
    }

    /// Parse the on-disk layout. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::IndexCorruption`] if the bytes are truncated, carry
    /// the wrong magic, or fail the checksum.
    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(SmcpError::corruption(origin, "file too short"));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if Sha256::digest(body).as_slice() != checksum {
            return Err(SmcpError::corruption(origin, "checksum mismatch"));
        }
        if &body[..8] != MAGIC {
            return Err(SmcpError::corruption(origin, "not an smcp vector index"));
        }

        let dimension = read_u32(&body[8..12]) as usize;
        let count = usize::try_from(read_u64(&body[12..20]))
            .map_err(|_| SmcpError::corruption(origin, "record count overflows"))?;
        let record_len = 8 + dimension * 4;
        let expected = count
            .checked_mul(record_len)
            .and_then(|n| n.checked_add(HEADER_LEN));
        if expected != Some(body.len()) {
            return Err(SmcpError::corruption(
                origin,
                format!("expected {count} records of dimension {dimension}"),
            ));
        }

        let mut index = Self::new(dimension);
        index.ids.reserve(count);
        index.data.reserve(count * dimension);
        for record in body[HEADER_LEN..].chunks_exact(record_len) {
            index.ids.push(read_u64(&record[..8]));
            index.data.extend(
                record[8..]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        Ok(index)
    }

    /// Rewrite the index file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Io`] if the file cannot be written.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes())?;
        tracing::debug!(path = %path.display(), vectors = self.len(), "persisted vector index");
        Ok(())
    }

    /// Read an index file written by [`VectorIndex::persist`].
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Io`] if the file cannot be read and
    /// [`SmcpError::IndexCorruption`] if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let index = Self::from_bytes(&bytes, path)?;
        tracing::info!(path = %path.display(), vectors = index.len(), dimension = index.dimension, "loaded vector index");
        Ok(index)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0_u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
