//! User-user collaborative filtering.
//!
//! "Users who interacted with X also interacted with Y": a sparse user×item
//! interaction matrix is rebuilt wholesale from the training window, cosine
//! similarity is computed across its rows, and neighbor-weighted item scores
//! fall out of the top-K similar users.

use crate::error::{RankingError, Result};
use crate::models::InteractionRecord;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Bidirectional id<->index bookkeeping for matrix rows and columns.
/// Lookups are O(1) in both directions.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    to_index: HashMap<Uuid, usize>,
    to_id: Vec<Uuid>,
}

impl IdIndex {
    /// Indices are assigned in ascending id order, which makes the matrix
    /// layout deterministic for a given input set.
    fn from_sorted(ids: BTreeSet<Uuid>) -> Self {
        let to_id: Vec<Uuid> = ids.into_iter().collect();
        let to_index = to_id
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        Self { to_index, to_id }
    }

    pub fn index_of(&self, id: &Uuid) -> Option<usize> {
        self.to_index.get(id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<Uuid> {
        self.to_id.get(index).copied()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.to_id
    }

    pub fn len(&self) -> usize {
        self.to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_id.is_empty()
    }
}

/// Sparse user×item matrix; cell = summed interaction weights for the pair.
#[derive(Debug, Clone)]
pub struct UserItemMatrix {
    users: IdIndex,
    items: IdIndex,
    rows: Vec<HashMap<usize, f64>>,
}

impl UserItemMatrix {
    /// Build from raw interactions. Weights for repeated (user, item) pairs
    /// are summed, so the result is independent of input order.
    pub fn build(interactions: &[InteractionRecord]) -> Self {
        let mut user_ids = BTreeSet::new();
        let mut item_ids = BTreeSet::new();
        for record in interactions {
            user_ids.insert(record.user_id);
            item_ids.insert(record.listing_id);
        }

        let users = IdIndex::from_sorted(user_ids);
        let items = IdIndex::from_sorted(item_ids);
        let mut rows: Vec<HashMap<usize, f64>> = vec![HashMap::new(); users.len()];

        for record in interactions {
            // Both ids were indexed above.
            let (Some(user_idx), Some(item_idx)) = (
                users.index_of(&record.user_id),
                items.index_of(&record.listing_id),
            ) else {
                continue;
            };
            *rows[user_idx].entry(item_idx).or_insert(0.0) += record.kind.weight();
        }

        Self { users, items, rows }
    }

    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn row(&self, user_index: usize) -> Option<&HashMap<usize, f64>> {
        self.rows.get(user_index)
    }

    /// Accumulated weight for a (user, item) pair; 0.0 when unseen.
    pub fn value(&self, user_id: &Uuid, item_id: &Uuid) -> f64 {
        let (Some(u), Some(i)) = (self.users.index_of(user_id), self.items.index_of(item_id))
        else {
            return 0.0;
        };
        self.rows[u].get(&i).copied().unwrap_or(0.0)
    }

    /// Number of items both users have interacted with.
    pub fn shared_item_count(&self, a: usize, b: usize) -> usize {
        let (Some(row_a), Some(row_b)) = (self.rows.get(a), self.rows.get(b)) else {
            return 0;
        };
        let (small, large) = if row_a.len() <= row_b.len() {
            (row_a, row_b)
        } else {
            (row_b, row_a)
        };
        small.keys().filter(|k| large.contains_key(*k)).count()
    }

    fn dot(&self, a: usize, b: usize) -> f64 {
        let (row_a, row_b) = (&self.rows[a], &self.rows[b]);
        let (small, large) = if row_a.len() <= row_b.len() {
            (row_a, row_b)
        } else {
            (row_b, row_a)
        };
        small
            .iter()
            .filter_map(|(k, v)| large.get(k).map(|w| v * w))
            .sum()
    }

    fn norm(&self, row: usize) -> f64 {
        self.rows[row].values().map(|v| v * v).sum::<f64>().sqrt()
    }
}

/// A precomputed neighbor of a user in the similarity structure.
#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub neighbor_id: Uuid,
    pub similarity: f64,
    pub shared_item_count: usize,
}

/// Collaborative filter lifecycle: unbuilt -> matrix built -> similarity
/// computed. Recommendations require the full lifecycle; training publishes
/// the completed filter for serving in one atomic swap.
#[derive(Debug, Clone, Default)]
pub struct CollaborativeFilter {
    matrix: Option<UserItemMatrix>,
    similarity: Option<Vec<Vec<f64>>>,
}

impl CollaborativeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix(&self) -> Option<&UserItemMatrix> {
        self.matrix.as_ref()
    }

    pub fn build_user_item_matrix(&mut self, interactions: &[InteractionRecord]) -> &UserItemMatrix {
        self.similarity = None;
        self.matrix.insert(UserItemMatrix::build(interactions))
    }

    /// Cosine similarity across all user rows. Calling this before the
    /// matrix is built is a caller bug.
    pub fn compute_user_similarity(&mut self) -> Result<()> {
        let matrix = self.matrix.as_ref().ok_or(RankingError::MatrixNotBuilt)?;

        let n = matrix.user_count();
        let norms: Vec<f64> = (0..n).map(|i| matrix.norm(i)).collect();
        let mut similarity = vec![vec![0.0; n]; n];

        for a in 0..n {
            similarity[a][a] = 1.0;
            for b in (a + 1)..n {
                let denom = norms[a] * norms[b];
                let sim = if denom > 0.0 {
                    matrix.dot(a, b) / denom
                } else {
                    0.0
                };
                similarity[a][b] = sim;
                similarity[b][a] = sim;
            }
        }

        self.similarity = Some(similarity);
        Ok(())
    }

    pub fn similarity_computed(&self) -> bool {
        self.similarity.is_some()
    }

    /// Neighbor-based scores for `candidates`. A user absent from the
    /// trained matrix is a cold start and gets an empty result. Only the
    /// `top_k` most similar users (self excluded) with positive similarity
    /// contribute, each adding `similarity * their accumulated item weight`.
    pub fn recommend(
        &self,
        user_id: &Uuid,
        candidates: &[Uuid],
        top_k: usize,
    ) -> Vec<(Uuid, f64)> {
        let (Some(matrix), Some(similarity)) = (self.matrix.as_ref(), self.similarity.as_ref())
        else {
            return Vec::new();
        };
        let Some(user_idx) = matrix.users().index_of(user_id) else {
            return Vec::new();
        };

        let sims = &similarity[user_idx];
        let mut neighbor_order: Vec<usize> =
            (0..sims.len()).filter(|&i| i != user_idx).collect();
        neighbor_order.sort_by(|&a, &b| {
            sims[b]
                .partial_cmp(&sims[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let candidate_set: HashSet<Uuid> = candidates.iter().copied().collect();
        let mut scores: HashMap<Uuid, f64> = HashMap::new();

        for &neighbor_idx in neighbor_order.iter().take(top_k) {
            let sim = sims[neighbor_idx];
            if sim <= 0.0 {
                continue;
            }
            let Some(row) = matrix.row(neighbor_idx) else {
                continue;
            };
            for (&item_idx, &weight) in row {
                if weight <= 0.0 {
                    continue;
                }
                let Some(item_id) = matrix.items().id_at(item_idx) else {
                    continue;
                };
                if candidate_set.contains(&item_id) {
                    *scores.entry(item_id).or_insert(0.0) += sim * weight;
                }
            }
        }

        let mut ranked: Vec<(Uuid, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Top neighbors of a user for persistence: at most `limit`, strictly
    /// above `min_similarity`, self excluded, annotated with the count of
    /// commonly interacted items.
    pub fn top_neighbors(
        &self,
        user_id: &Uuid,
        limit: usize,
        min_similarity: f64,
    ) -> Vec<NeighborEntry> {
        let (Some(matrix), Some(similarity)) = (self.matrix.as_ref(), self.similarity.as_ref())
        else {
            return Vec::new();
        };
        let Some(user_idx) = matrix.users().index_of(user_id) else {
            return Vec::new();
        };

        let sims = &similarity[user_idx];
        let mut order: Vec<usize> = (0..sims.len()).filter(|&i| i != user_idx).collect();
        order.sort_by(|&a, &b| {
            sims[b]
                .partial_cmp(&sims[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        order
            .into_iter()
            .take(limit)
            .filter(|&idx| sims[idx] > min_similarity)
            .filter_map(|idx| {
                matrix.users().id_at(idx).map(|neighbor_id| NeighborEntry {
                    neighbor_id,
                    similarity: sims[idx],
                    shared_item_count: matrix.shared_item_count(user_idx, idx),
                })
            })
            .collect()
    }
}
