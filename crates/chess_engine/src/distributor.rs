//! Balanced block partitioning of root children over the worker set, and
//! the inverse reassembly of per-worker results.

use std::io;
use std::ops::Range;
use chess_core::Move;
use thiserror::Error;

use crate::codec::MalformedRecordError;
use crate::evaluation::Score;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("a round needs at least one participant")]
    NoWorkers,
    #[error("expected results from {expected} participants, got {actual}")]
    WorkerCountMismatch { expected: usize, actual: usize },
    #[error("rank {rank} was assigned {expected} records but reported {actual}")]
    ChunkSizeMismatch { rank: usize, expected: usize, actual: usize },
    #[error("rank {rank} exchanged a malformed record: {source}")]
    Malformed {
        rank: usize,
        #[source]
        source: MalformedRecordError,
    },
    #[error("rank {rank} is outside a layout of {worker_count} ranks")]
    UnknownRank { rank: usize, worker_count: usize },
    #[error("unexpected reply from rank {0}")]
    UnexpectedReply(usize),
    #[error("worker pool disconnected before the round completed")]
    WorkerDisconnected,
    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The broadcast chunk layout of one round: how many records each rank
/// owns and where its chunk starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    sizes: Vec<usize>,
    displacements: Vec<usize>,
}

impl ChunkLayout {
    /// Splits `total` records over `worker_count` ranks. Sizes differ by at
    /// most one and the first `total % worker_count` ranks get the extra one.
    pub fn balanced(total: usize, worker_count: usize) -> Result<Self, ProtocolError> {
        if worker_count == 0 {
            return Err(ProtocolError::NoWorkers);
        }
        let base = total / worker_count;
        let extra = total % worker_count;
        let sizes: Vec<usize> = (0..worker_count)
            .map(|rank| base + usize::from(rank < extra))
            .collect();
        let displacements = sizes
            .iter()
            .scan(0, |offset, &size| {
                let start = *offset;
                *offset += size;
                Some(start)
            })
            .collect();
        Ok(Self { sizes, displacements })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn displacements(&self) -> &[usize] {
        &self.displacements
    }

    pub fn worker_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Records assigned to `rank`, or `None` past the last rank.
    pub fn size(&self, rank: usize) -> Option<usize> {
        self.sizes.get(rank).copied()
    }

    pub fn range(&self, rank: usize) -> Option<Range<usize>> {
        let start = *self.displacements.get(rank)?;
        Some(start..start + self.sizes[rank])
    }

    /// Like [`ChunkLayout::size`], for ranks that must be part of the round.
    pub fn expect_size(&self, rank: usize) -> Result<usize, ProtocolError> {
        self.size(rank).ok_or(ProtocolError::UnknownRank { rank, worker_count: self.worker_count() })
    }
}

/// One rank's contiguous share of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkBatch<T> {
    pub rank: usize,
    pub items: Vec<T>,
}

/// A worker's answer for one root child. Only the score matters to the
/// coordinator; `reply` is the worker's own best reply, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredMove {
    pub reply: Option<Move>,
    pub score: Score,
}

pub fn scatter<T>(items: Vec<T>, worker_count: usize) -> Result<(ChunkLayout, Vec<WorkBatch<T>>), ProtocolError> {
    let layout = ChunkLayout::balanced(items.len(), worker_count)?;
    let mut remaining = items.into_iter();
    let batches = layout
        .sizes()
        .iter()
        .enumerate()
        .map(|(rank, &size)| WorkBatch {
            rank,
            items: remaining.by_ref().take(size).collect(),
        })
        .collect();
    Ok((layout, batches))
}

/// Concatenates per-rank results in rank order. Every rank must report
/// exactly as many results as the layout assigned it.
pub fn gather<T>(layout: &ChunkLayout, per_worker: Vec<Vec<T>>) -> Result<Vec<T>, ProtocolError> {
    if per_worker.len() != layout.worker_count() {
        return Err(ProtocolError::WorkerCountMismatch {
            expected: layout.worker_count(),
            actual: per_worker.len(),
        });
    }
    for (rank, (results, &expected)) in per_worker.iter().zip(layout.sizes()).enumerate() {
        if results.len() != expected {
            return Err(ProtocolError::ChunkSizeMismatch { rank, expected, actual: results.len() });
        }
    }
    Ok(per_worker.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 1)]
    #[test_case(0, 4)]
    #[test_case(1, 4)]
    #[test_case(20, 1)]
    #[test_case(20, 3)]
    #[test_case(20, 6)]
    #[test_case(21, 4)]
    #[test_case(3, 8)]
    #[test_case(48, 7)]
    fn partition_is_balanced_and_ordered(n: usize, p: usize) {
        let items: Vec<usize> = (0..n).collect();
        let (layout, batches) = scatter(items.clone(), p).unwrap();

        assert_eq!(batches.len(), p);
        assert_eq!(layout.total(), n);
        let sizes: Vec<usize> = batches.iter().map(|b| b.items.len()).collect();
        assert_eq!(sizes, layout.sizes());
        let max = sizes.iter().max().copied().unwrap_or(0);
        let min = sizes.iter().min().copied().unwrap_or(0);
        assert!(max - min <= 1);
        // Larger chunks come first
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]));

        for batch in &batches {
            let range = layout.range(batch.rank).unwrap();
            assert_eq!(batch.items, items[range].to_vec());
        }

        let per_worker = batches.into_iter().map(|b| b.items).collect();
        assert_eq!(gather(&layout, per_worker).unwrap(), items);
    }

    #[test]
    fn layout_matches_array_split() {
        let layout = ChunkLayout::balanced(20, 3).unwrap();
        assert_eq!(layout.sizes(), &[7, 7, 6]);
        assert_eq!(layout.displacements(), &[0, 7, 14]);
        assert_eq!(layout.range(2), Some(14..20));
    }

    #[test]
    fn ranks_past_the_layout_have_no_chunk() {
        let layout = ChunkLayout::balanced(5, 2).unwrap();
        assert_eq!(layout.size(1), Some(2));
        assert_eq!(layout.size(2), None);
        assert_eq!(layout.range(2), None);
        assert!(matches!(
            layout.expect_size(2),
            Err(ProtocolError::UnknownRank { rank: 2, worker_count: 2 })
        ));
    }

    #[test]
    fn zero_workers_is_an_error() {
        assert!(matches!(ChunkLayout::balanced(5, 0), Err(ProtocolError::NoWorkers)));
        assert!(matches!(scatter(vec![1, 2, 3], 0), Err(ProtocolError::NoWorkers)));
    }

    #[test]
    fn gather_rejects_short_chunk() {
        let layout = ChunkLayout::balanced(5, 2).unwrap();
        let result = gather(&layout, vec![vec![1, 2, 3], vec![4]]);
        assert!(matches!(
            result,
            Err(ProtocolError::ChunkSizeMismatch { rank: 1, expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn gather_rejects_missing_rank() {
        let layout = ChunkLayout::balanced(4, 2).unwrap();
        let result = gather(&layout, vec![vec![1, 2, 3, 4]]);
        assert!(matches!(result, Err(ProtocolError::WorkerCountMismatch { expected: 2, actual: 1 })));
    }
}
