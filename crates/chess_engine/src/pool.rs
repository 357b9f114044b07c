//! A fixed pool of search participants working in lock-step rounds.
//!
//! Rank 0 is the coordinator and lives on the caller's thread; ranks
//! 1..P-1 are long-lived worker threads. Every board and result crosses
//! between them as encoded records. A round either returns one result per
//! child, in child order, or fails as a whole.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chess_core::{Board, piece::Color};
use log::{debug, warn};

use crate::codec::{decode_boards, decode_moves, encode_boards, encode_moves};
use crate::config::{EngineConfig, SearchMethod};
use crate::distributor::{gather, scatter, ChunkLayout, ProtocolError, ScoredMove};
use crate::error::EngineError;
use crate::evaluation::{Evaluator, Score};
use crate::search::search_best_move;

/// Broadcast to every participant along with its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParams {
    /// Depth each child is searched to. Ignored by the oracle.
    pub depth: u8,
}

struct RoundRequest {
    round: u64,
    layout: ChunkLayout,
    params: RoundParams,
    records: Vec<i32>,
}

// One move record and one score record per child
struct ReplyRecords {
    moves: Vec<i32>,
    scores: Vec<Score>,
}

struct RoundReply {
    round: u64,
    rank: usize,
    result: Result<ReplyRecords, EngineError>,
}

enum Job {
    Round(RoundRequest),
    Shutdown,
}

struct WorkerHandle {
    rank: usize,
    jobs: Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

pub struct WorkerPool {
    coordinator: Evaluator,
    workers: Vec<WorkerHandle>,
    replies: Receiver<RoundReply>,
    round: u64,
}

impl WorkerPool {
    /// Validates `config` and starts `config.workers` participants, each
    /// with its own evaluator.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let evaluators = (0..config.workers)
            .map(|_| Evaluator::from_config(config))
            .collect::<Result<Vec<_>, _>>()?;
        Self::spawn(evaluators)
    }

    /// The first evaluator stays with the coordinator; every other one gets
    /// a worker thread.
    pub fn spawn(evaluators: Vec<Evaluator>) -> Result<Self, EngineError> {
        let mut evaluators = evaluators.into_iter();
        let coordinator = evaluators.next().ok_or(ProtocolError::NoWorkers)?;
        let (reply_tx, replies) = mpsc::channel();

        let mut workers = Vec::new();
        for (offset, evaluator) in evaluators.enumerate() {
            let rank = offset + 1;
            let (jobs, job_rx) = mpsc::channel();
            let reply_tx = reply_tx.clone();
            let thread = thread::Builder::new()
                .name(format!("search-worker-{rank}"))
                .spawn(move || worker_loop(rank, evaluator, job_rx, reply_tx))
                .map_err(ProtocolError::Spawn)?;
            workers.push(WorkerHandle { rank, jobs, thread: Some(thread) });
        }
        // Only workers hold reply senders, so recv fails once they are all gone
        drop(reply_tx);

        debug!("Started worker pool with {} participants", workers.len() + 1);
        Ok(Self { coordinator, workers, replies, round: 0 })
    }

    /// Participants, coordinator included.
    pub fn size(&self) -> usize {
        self.workers.len() + 1
    }

    pub fn method(&self) -> SearchMethod {
        self.coordinator.method()
    }

    /// Scores every child across the pool. Results come back in the order
    /// of `children`.
    pub fn run_round(&mut self, children: Vec<Board>, params: RoundParams) -> Result<Vec<ScoredMove>, EngineError> {
        self.round += 1;
        let round = self.round;
        let (layout, batches) = scatter(children, self.size())?;
        debug!("Round {round}: chunk sizes {:?}", layout.sizes());

        let mut own = None;
        for batch in batches {
            let request = RoundRequest {
                round,
                layout: layout.clone(),
                params,
                records: encode_boards(&batch.items),
            };
            if batch.rank == 0 {
                own = Some(request);
                continue;
            }
            let worker = self
                .workers
                .get(batch.rank - 1)
                .ok_or(ProtocolError::WorkerCountMismatch { expected: layout.worker_count(), actual: self.size() })?;
            worker
                .jobs
                .send(Job::Round(request))
                .map_err(|_| ProtocolError::WorkerDisconnected)?;
        }

        let mut results: Vec<Option<Result<ReplyRecords, EngineError>>> =
            (0..self.size()).map(|_| None).collect();
        results[0] = Some(match own {
            Some(request) => serve_round(0, &request, &mut self.coordinator),
            None => Ok(ReplyRecords { moves: Vec::new(), scores: Vec::new() }),
        });

        // Rendezvous: nothing is validated until every worker has answered
        let mut pending = self.workers.len();
        while pending > 0 {
            let reply = self.replies.recv().map_err(|_| ProtocolError::WorkerDisconnected)?;
            if reply.round != round {
                warn!("Discarding reply from rank {} for stale round {}", reply.rank, reply.round);
                continue;
            }
            match results.get_mut(reply.rank) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(reply.result);
                    pending -= 1;
                }
                _ => return Err(ProtocolError::UnexpectedReply(reply.rank).into()),
            }
        }

        let mut per_worker = Vec::with_capacity(results.len());
        for (rank, slot) in results.into_iter().enumerate() {
            let records = slot
                .ok_or(ProtocolError::WorkerDisconnected)?
                .map_err(|source| EngineError::Worker { rank, source: Box::new(source) })?;
            per_worker.push(decode_reply(rank, &layout, records)?);
        }
        Ok(gather(&layout, per_worker)?)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.jobs.send(Job::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!("Worker {} panicked", worker.rank);
                }
            }
        }
    }
}

fn worker_loop(rank: usize, mut evaluator: Evaluator, jobs: Receiver<Job>, replies: Sender<RoundReply>) {
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Round(request) => {
                let result = serve_round(rank, &request, &mut evaluator);
                let reply = RoundReply { round: request.round, rank, result };
                if replies.send(reply).is_err() {
                    break;
                }
            }
            Job::Shutdown => break,
        }
    }
    debug!("Worker {rank} stopped");
}

// Decode, score and encode one participant's chunk.
fn serve_round(rank: usize, request: &RoundRequest, evaluator: &mut Evaluator) -> Result<ReplyRecords, EngineError> {
    let boards = decode_boards(&request.records).map_err(|source| ProtocolError::Malformed { rank, source })?;
    let expected = request.layout.expect_size(rank)?;
    if boards.len() != expected {
        return Err(ProtocolError::ChunkSizeMismatch { rank, expected, actual: boards.len() }.into());
    }

    let scored = score_batch(&boards, request.params, evaluator)?;
    Ok(ReplyRecords {
        moves: encode_moves(scored.iter().map(|s| s.reply)),
        scores: scored.iter().map(|s| s.score).collect(),
    })
}

/// Scores each child in order. The oracle answers directly; the heuristic
/// evaluator runs a search to `params.depth`. Scores are White-oriented.
pub fn score_batch(boards: &[Board], params: RoundParams, evaluator: &mut Evaluator) -> Result<Vec<ScoredMove>, EngineError> {
    let mut scored = Vec::with_capacity(boards.len());
    for child in boards {
        let entry = match evaluator {
            Evaluator::Oracle(oracle) => {
                let verdict = oracle.analyse(child)?;
                ScoredMove {
                    reply: verdict.best_move,
                    score: verdict.for_side(child.current_turn(), Color::White),
                }
            }
            Evaluator::Heuristic(_) => {
                let outcome = search_best_move(child, params.depth, evaluator)?;
                ScoredMove { reply: outcome.best_move, score: outcome.score }
            }
        };
        scored.push(entry);
    }
    Ok(scored)
}

fn decode_reply(rank: usize, layout: &ChunkLayout, records: ReplyRecords) -> Result<Vec<ScoredMove>, ProtocolError> {
    let expected = layout.expect_size(rank)?;
    let moves = decode_moves(&records.moves).map_err(|source| ProtocolError::Malformed { rank, source })?;
    for actual in [moves.len(), records.scores.len()] {
        if actual != expected {
            return Err(ProtocolError::ChunkSizeMismatch { rank, expected, actual });
        }
    }
    Ok(moves
        .into_iter()
        .zip(records.scores)
        .map(|(reply, score)| ScoredMove { reply, score })
        .collect())
}
