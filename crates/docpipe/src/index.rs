//! Similarity index collaborator. The result sink upserts embeddings here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::IndexError;

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Creates the named index if it does not exist yet.
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), IndexError>;

    async fn upsert(&self, id: &str, envelope: &Envelope, vector: &[f32]) -> Result<(), IndexError>;
}

/// Used when indexing is disabled.
pub struct NoopIndex;

#[async_trait]
impl SimilarityIndex for NoopIndex {
    async fn create_index(&self, _name: &str, _dimension: usize) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, _id: &str, _envelope: &Envelope, _vector: &[f32]) -> Result<(), IndexError> {
        Ok(())
    }
}

struct IndexData {
    dimension: usize,
    entries: HashMap<String, (Envelope, Vec<f32>)>,
}

/// In-process index with brute-force cosine search. Upserts go to the index
/// named at construction, which must have been created first.
pub struct MemoryIndex {
    active: String,
    indexes: Mutex<HashMap<String, IndexData>>,
}

impl MemoryIndex {
    pub fn new(active: &str) -> Self {
        Self {
            active: active.to_string(),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.indexes
            .lock()
            .ok()
            .and_then(|guard| guard.get(&self.active).map(|data| data.entries.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Envelope> {
        let guard = self.indexes.lock().ok()?;
        guard
            .get(&self.active)?
            .entries
            .get(id)
            .map(|(envelope, _)| envelope.clone())
    }

    /// The `k` most similar ids, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let Ok(guard) = self.indexes.lock() else {
            return Vec::new();
        };
        let Some(data) = guard.get(&self.active) else {
            return Vec::new();
        };

        let mut scored: Vec<(String, f32)> = data
            .entries
            .iter()
            .map(|(id, (_, vector))| (id.clone(), cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl SimilarityIndex for MemoryIndex {
    async fn create_index(&self, name: &str, dimension: usize) -> Result<(), IndexError> {
        let mut guard = self.indexes.lock().map_err(|_| IndexError::MissingIndex {
            name: name.to_string(),
        })?;
        guard.entry(name.to_string()).or_insert_with(|| IndexData {
            dimension,
            entries: HashMap::new(),
        });
        Ok(())
    }

    async fn upsert(&self, id: &str, envelope: &Envelope, vector: &[f32]) -> Result<(), IndexError> {
        let missing = || IndexError::MissingIndex {
            name: self.active.clone(),
        };
        let mut guard = self.indexes.lock().map_err(|_| missing())?;
        let data = guard.get_mut(&self.active).ok_or_else(missing)?;

        if vector.len() != data.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: data.dimension,
                actual: vector.len(),
            });
        }

        data.entries
            .insert(id.to_string(), (envelope.clone(), vector.to_vec()));
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
