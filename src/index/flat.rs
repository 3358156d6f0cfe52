// Exhaustive L2 index stored in the FAISS `IndexFlatL2` layout

use std::cmp::Ordering;
use std::io::{Cursor, Read};

use super::IndexError;

const FOURCC: &[u8; 4] = b"IxF2";
const HEADER_DUMMY: i64 = 1 << 20;
const METRIC_L2: i32 = 1;

/// Nearest neighbour with its squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    /// Row-major, `dimension` floats per vector
    data: Vec<f32>,
}

impl FlatL2Index {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Up to `k` nearest rows, ascending by distance then position
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                distance: squared_l2(row, query),
            })
            .collect();

        hits.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => a.position.cmp(&b.position),
            other => other,
        });
        hits.truncate(k);

        Ok(hits)
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(45 + self.data.len() * 4);
        bytes.extend_from_slice(FOURCC);
        bytes.extend_from_slice(&(self.dimension as i32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as i64).to_le_bytes());
        bytes.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        bytes.extend_from_slice(&HEADER_DUMMY.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&METRIC_L2.to_le_bytes());
        bytes.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = Cursor::new(bytes);

        let fourcc: [u8; 4] = read_array(&mut reader)?;
        if &fourcc != FOURCC {
            return Err(corrupt("not a flat L2 index"));
        }

        let dimension = i32::from_le_bytes(read_array(&mut reader)?);
        let ntotal = i64::from_le_bytes(read_array(&mut reader)?);
        let _dummy: [u8; 16] = read_array(&mut reader)?;
        let _is_trained: [u8; 1] = read_array(&mut reader)?;
        let metric = i32::from_le_bytes(read_array(&mut reader)?);
        let float_count = u64::from_le_bytes(read_array(&mut reader)?);

        if metric != METRIC_L2 {
            return Err(corrupt(&format!("unsupported metric type {}", metric)));
        }
        let dimension =
            usize::try_from(dimension).map_err(|_| corrupt("negative dimension"))?;
        let ntotal = usize::try_from(ntotal).map_err(|_| corrupt("negative vector count"))?;
        let float_count =
            usize::try_from(float_count).map_err(|_| corrupt("vector payload too large"))?;

        if dimension == 0 && ntotal > 0 {
            return Err(corrupt("vectors stored with zero dimension"));
        }
        if ntotal.checked_mul(dimension) != Some(float_count) {
            return Err(corrupt("vector count disagrees with payload size"));
        }
        let payload_len = float_count
            .checked_mul(4)
            .ok_or_else(|| corrupt("vector payload too large"))?;

        let payload = &bytes[reader.position() as usize..];
        if payload.len() != payload_len {
            return Err(corrupt("truncated vector payload"));
        }

        let data = payload
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

fn read_array<const N: usize>(reader: &mut Cursor<&[u8]>) -> Result<[u8; N], IndexError> {
    let mut buf = [0_u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|_| corrupt("truncated index header"))?;
    Ok(buf)
}

fn corrupt(reason: &str) -> IndexError {
    IndexError::Corrupt(reason.to_string())
}
