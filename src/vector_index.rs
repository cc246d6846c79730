//! In-memory exact nearest-neighbor index over chunk embeddings.
//!
//! Flat L2 search: every query scans all stored vectors. The dimension is
//! fixed at construction and every vector in or out is checked against it.
//! Chunks and vectors live in one `parking_lot::RwLock` so a batch insert
//! is visible all at once or not at all. Re-indexing a document swaps its
//! old chunks for the new ones under that same lock.

use parking_lot::RwLock;

use crate::error::{EngineError, Result};
use crate::models::DocumentChunk;

pub use crate::embedding::l2_normalize;

#[derive(Default)]
struct Entries {
    vectors: Vec<Vec<f32>>,
    chunks: Vec<DocumentChunk>,
}

impl Entries {
    /// Drop every entry belonging to `document_id`; returns how many went.
    fn remove_document(&mut self, document_id: &str) -> usize {
        let before = self.chunks.len();
        let (vectors, chunks): (Vec<Vec<f32>>, Vec<DocumentChunk>) = std::mem::take(&mut self.vectors)
            .into_iter()
            .zip(std::mem::take(&mut self.chunks))
            .filter(|(_, chunk)| chunk.document_id != document_id)
            .unzip();
        self.vectors = vectors;
        self.chunks = chunks;
        before - self.chunks.len()
    }
}

pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<Entries>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.entries.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn check(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }

    fn check_batch(&self, embeddings: &[Vec<f32>], chunks: &[DocumentChunk]) -> Result<()> {
        if embeddings.len() != chunks.len() {
            return Err(EngineError::Validation(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        embeddings.iter().try_for_each(|v| self.check(v))
    }

    /// Append `chunks` with their `embeddings`. Validates everything before
    /// touching the index.
    pub fn add(&self, embeddings: Vec<Vec<f32>>, chunks: Vec<DocumentChunk>) -> Result<()> {
        self.check_batch(&embeddings, &chunks)?;

        let mut entries = self.entries.write();
        entries.vectors.extend(embeddings);
        entries.chunks.extend(chunks);
        Ok(())
    }

    /// Replace everything indexed for `document_id` with `chunks`. An empty
    /// batch just removes the document. Returns the number of chunks removed.
    pub fn replace_document(
        &self,
        document_id: &str,
        embeddings: Vec<Vec<f32>>,
        chunks: Vec<DocumentChunk>,
    ) -> Result<usize> {
        self.check_batch(&embeddings, &chunks)?;

        let mut entries = self.entries.write();
        let removed = entries.remove_document(document_id);
        entries.vectors.extend(embeddings);
        entries.chunks.extend(chunks);
        Ok(removed)
    }

    pub fn remove_document(&self, document_id: &str) -> usize {
        self.entries.write().remove_document(document_id)
    }

    /// Up to `k` chunks ordered by ascending Euclidean distance to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<DocumentChunk>> {
        self.check(query)?;
        let entries = self.entries.read();
        if entries.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = entries
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .filter_map(|(i, _)| entries.chunks.get(i).cloned())
            .collect())
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.vectors.clear();
        entries.chunks.clear();
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::BTreeMap;

    fn chunk(id: &str) -> DocumentChunk {
        chunk_of("doc.txt", id)
    }

    fn chunk_of(document_id: &str, id: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            document_id: document_id.to_string(),
            content: format!("content of {}", id),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_empty_search() {
        let index = VectorIndex::new(3);
        assert!(index.search(&[0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_add_dimension_mismatch_leaves_index_untouched() {
        let index = VectorIndex::new(3);
        let err = index
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]],
                vec![chunk("a"), chunk("b")],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = VectorIndex::new(3);
        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let index = VectorIndex::new(2);
        let err = index.add(vec![vec![1.0, 0.0]], vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_fewer_than_k_nearest_first() {
        let index = VectorIndex::new(2);
        index
            .add(
                vec![vec![10.0, 10.0], vec![1.0, 1.0], vec![0.0, 0.1]],
                vec![chunk("far"), chunk("mid"), chunk("near")],
            )
            .unwrap();
        let hits = index.search(&[0.0, 0.0], 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);

        let top1 = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(top1[0].chunk_id, "near");
    }

    #[test]
    fn test_clear() {
        let index = VectorIndex::new(1);
        index.add(vec![vec![1.0]], vec![chunk("a")]).unwrap();
        assert_eq!(index.size(), 1);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 1);
    }

    #[test]
    fn test_replace_document_swaps_only_that_document() {
        let index = VectorIndex::new(1);
        index
            .add(
                vec![vec![1.0], vec![2.0], vec![3.0]],
                vec![chunk_of("a.txt", "a-0"), chunk_of("a.txt", "a-1"), chunk_of("b.txt", "b-0")],
            )
            .unwrap();

        let removed = index
            .replace_document("a.txt", vec![vec![1.5]], vec![chunk_of("a.txt", "a-0")])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.size(), 2);

        let ids: Vec<_> = index
            .search(&[0.0], 10)
            .unwrap()
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        assert_eq!(ids, vec!["a-0", "b-0"]);
    }

    #[test]
    fn test_replace_document_rejects_bad_batch_without_removing() {
        let index = VectorIndex::new(2);
        index.add(vec![vec![0.0, 1.0]], vec![chunk("a")]).unwrap();
        let err = index
            .replace_document("doc.txt", vec![vec![1.0]], vec![chunk("a")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(index.size(), 1);

        assert_eq!(index.remove_document("doc.txt"), 1);
        assert!(index.is_empty());
    }
}
