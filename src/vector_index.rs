//! Flat nearest-neighbor index over fixed-width embedding vectors.
//!
//! The index keeps every (id, vector) pair in memory and scans linearly on
//! search, ranking by squared Euclidean distance. At mail-archive scale an
//! exact scan comfortably beats the constant factors of an approximate
//! structure, and the ordering contract ("closer vectors rank first") holds
//! trivially.
//!
//! State is persisted to a single file after every successful addition
//! batch. The file is a reconstructible cache of the embedding pipeline, not
//! primary data: a crash mid-write loses nothing that `mailmind sync` cannot
//! regenerate. Writes go through a temp file and rename so readers never see
//! a torn file.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// File magic: "MMVI", little-endian.
const MAGIC: u32 = 0x4956_4D4D;

/// Usage errors raised by index mutation and search. These indicate a
/// programming or configuration error upstream (for example an embedding
/// model swapped without rebuilding the index) and must not be swallowed.
#[derive(Debug, PartialEq, Eq)]
pub enum IndexError {
    /// A vector's width disagrees with the index's fixed dimensionality.
    DimensionMismatch { expected: usize, got: usize },
    /// An addition batch had differing id and vector counts.
    LengthMismatch { ids: usize, vectors: usize },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::DimensionMismatch { expected, got } => {
                write!(f, "vector dimension mismatch: index is {expected}-wide, got {got}")
            }
            IndexError::LengthMismatch { ids, vectors } => {
                write!(f, "ids/vectors length mismatch: {ids} ids, {vectors} vectors")
            }
        }
    }
}

impl std::error::Error for IndexError {}

/// Exact nearest-neighbor index with file persistence.
///
/// Dimensionality is fixed at construction (from configuration, not probed
/// from a model) and every vector added over the index's lifetime must match
/// it. Not internally synchronized: callers serialize writes and keep reads
/// apart from writes.
#[derive(Debug)]
pub struct VectorIndex {
    dim: usize,
    path: PathBuf,
    ids: Vec<i64>,
    /// Row-major storage, `ids.len() * dim` floats.
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// New empty index persisting to `path`.
    pub fn create(dim: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            dim,
            path: path.into(),
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Load the persisted index at `path` if present, otherwise start empty.
    ///
    /// Fails if a persisted file exists but its stored width disagrees with
    /// `dim` — that means the configured embedding model changed and the
    /// index must be rebuilt, not silently reused.
    pub fn open(dim: usize, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::create(dim, path));
        }

        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open vector index: {}", path.display()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (stored_dim, ids, vectors) = decode(&bytes)
            .with_context(|| format!("corrupt vector index file: {}", path.display()))?;
        if stored_dim != dim {
            bail!(
                "vector index at {} is {}-wide but configuration says {}; \
                 delete the file and re-run sync to rebuild it",
                path.display(),
                stored_dim,
                dim
            );
        }

        tracing::info!(path = %path.display(), entries = ids.len(), "loaded vector index");
        Ok(Self {
            dim,
            path,
            ids,
            vectors,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add a batch of (id, vector) pairs and persist the full index state.
    ///
    /// Validation happens before any mutation: on `LengthMismatch` or
    /// `DimensionMismatch` the index is unchanged. On success every pair is
    /// searchable and the state has reached disk before the call returns.
    pub fn add_items(&mut self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            }
            .into());
        }
        for v in vectors {
            if v.len() != self.dim {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dim,
                    got: v.len(),
                }
                .into());
            }
        }

        self.ids.extend_from_slice(ids);
        for v in vectors {
            self.vectors.extend_from_slice(v);
        }

        self.persist()?;
        tracing::info!(added = ids.len(), total = self.ids.len(), "added vectors to index");
        Ok(())
    }

    /// Up to `k` (id, distance) pairs by ascending squared Euclidean
    /// distance. An empty index yields an empty result, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(i64, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, &id)| {
                let start = row * self.dim;
                let v = &self.vectors[start..start + self.dim];
                (id, squared_l2(query, v))
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize the full index state to the configured path, creating
    /// parent directories as needed. Overwrites atomically via temp file +
    /// rename. Idempotent.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("idx.tmp");
        {
            let mut file = std::fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(&self.encode())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Little-endian layout: magic, dim (u32), count (u64), then per entry
    /// an i64 id followed by `dim` f32 components.
    fn encode(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(16 + self.ids.len() * (8 + self.dim * 4));
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.ids.len() as u64).to_le_bytes());
        for (row, &id) in self.ids.iter().enumerate() {
            bytes.extend_from_slice(&id.to_le_bytes());
            let start = row * self.dim;
            for &v in &self.vectors[start..start + self.dim] {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes
    }
}

fn decode(bytes: &[u8]) -> Result<(usize, Vec<i64>, Vec<f32>)> {
    let mut cursor = 0usize;

    let magic = read_u32(bytes, &mut cursor)?;
    if magic != MAGIC {
        bail!("bad magic: {magic:#x}");
    }
    let dim = read_u32(bytes, &mut cursor)? as usize;
    let count = read_u64(bytes, &mut cursor)? as usize;

    let entry_len = 8 + dim * 4;
    let expected = cursor + count * entry_len;
    if bytes.len() != expected {
        bail!("truncated index: {} bytes, expected {}", bytes.len(), expected);
    }

    let mut ids = Vec::with_capacity(count);
    let mut vectors = Vec::with_capacity(count * dim);
    for _ in 0..count {
        let id_bytes: [u8; 8] = bytes[cursor..cursor + 8].try_into()?;
        ids.push(i64::from_le_bytes(id_bytes));
        cursor += 8;
        for _ in 0..dim {
            let v: [u8; 4] = bytes[cursor..cursor + 4].try_into()?;
            vectors.push(f32::from_le_bytes(v));
            cursor += 4;
        }
    }

    Ok((dim, ids, vectors))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = *cursor + 4;
    if end > bytes.len() {
        bail!("unexpected end of file");
    }
    let v = u32::from_le_bytes(bytes[*cursor..end].try_into()?);
    *cursor = end;
    Ok(v)
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let end = *cursor + 8;
    if end > bytes.len() {
        bail!("unexpected end of file");
    }
    let v = u64::from_le_bytes(bytes[*cursor..end].try_into()?);
    *cursor = end;
    Ok(v)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
