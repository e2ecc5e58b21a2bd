//! Chunked bulk block operations.
//!
//! A build can hold tens of thousands of blocks, far more than one request
//! should carry. [`BatchCoordinator`] splits the working set into ordered
//! chunks of at most `chunk_size` blocks and sends them one after another over
//! a [`SessionChannel`]. The first chunk that fails stops the run: the result
//! reports how many blocks were applied before it and which chunk failed, so a
//! caller can retry the remaining suffix if they want to. Nothing is retried
//! automatically.
//!
//! [`BatchCoordinator::run_pooled`] spreads chunks over several independent
//! channels instead. Ordering across chunks is then lost, and a failure only
//! stops new chunks from being issued; chunks already in flight are allowed to
//! finish.
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    error::{ChannelError, ProtocolError, ValidationError},
    model::Block,
    protocol::{
        RequestEncoder, RequestPayload, SessionChannel, Status, decoder::decode_set_blocks,
        validate_blocks,
    },
};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Shared flag a caller flips to stop a batch between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused for the next batch.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Emitted after every chunk that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub chunk_index: usize,
    pub chunks: usize,
    /// Blocks applied so far, over every completed chunk.
    pub applied: usize,
    pub total: usize,
}

pub trait BatchObserver {
    fn chunk_completed(&self, progress: &Progress);
}

impl<F> BatchObserver for F
where
    F: Fn(&Progress),
{
    fn chunk_completed(&self, progress: &Progress) {
        self(progress)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl BatchObserver for NoProgress {
    fn chunk_completed(&self, _: &Progress) {}
}

/// Why a batch stopped early.
#[derive(Debug)]
pub enum FailureCause {
    Channel(ChannelError),
    Protocol(ProtocolError),
    /// The server refused the whole chunk.
    Rejected {
        status: Status,
        message: Option<String>,
    },
    Cancelled,
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub cause: FailureCause,
}

#[derive(Debug)]
pub struct BatchResult {
    pub total: usize,
    /// Blocks the server reported as placed.
    pub applied: usize,
    /// Blocks the server refused inside otherwise accepted chunks.
    pub rejected: usize,
    pub chunks_sent: usize,
    pub failure: Option<ChunkFailure>,
}

impl BatchResult {
    fn new(total: usize) -> Self {
        Self {
            total,
            applied: 0,
            rejected: 0,
            chunks_sent: 0,
            failure: None,
        }
    }

    /// True when every chunk was sent and answered.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failed_at(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.chunk_index)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChunkReport {
    applied: usize,
    rejected: usize,
}

struct Chunk {
    payload: RequestPayload,
    blocks: usize,
}

pub struct BatchCoordinator<'a> {
    encoder: &'a RequestEncoder,
    chunk_size: usize,
    timeout: Duration,
}

impl<'a> BatchCoordinator<'a> {
    /// A `chunk_size` of zero is treated as one.
    pub fn new(encoder: &'a RequestEncoder, chunk_size: usize, timeout: Duration) -> Self {
        Self {
            encoder,
            chunk_size: chunk_size.max(1),
            timeout,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunk requests a working set of `blocks` blocks needs.
    pub fn chunk_count(&self, blocks: usize) -> usize {
        blocks.div_ceil(self.chunk_size)
    }

    /// Places `blocks` chunk by chunk, in order, over one channel.
    ///
    /// Only invalid input is an `Err`; everything that goes wrong once I/O has
    /// started is reported through [`BatchResult::failure`].
    pub fn run(
        &self,
        channel: &SessionChannel,
        blocks: &[Block],
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ValidationError> {
        let chunks = self.prepare(blocks)?;
        let mut result = BatchResult::new(blocks.len());
        info!(
            "placing {} blocks in {} chunks of up to {}",
            blocks.len(),
            chunks.len(),
            self.chunk_size
        );

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("batch cancelled before chunk {chunk_index}");
                result.failure = Some(ChunkFailure {
                    chunk_index,
                    cause: FailureCause::Cancelled,
                });
                break;
            }

            result.chunks_sent += 1;
            match self.dispatch(channel, chunk) {
                Ok(report) => {
                    result.applied += report.applied;
                    result.rejected += report.rejected;
                    observer.chunk_completed(&Progress {
                        chunk_index,
                        chunks: chunks.len(),
                        applied: result.applied,
                        total: result.total,
                    });
                }
                Err(cause) => {
                    warn!("batch stopped at chunk {chunk_index}: {cause:?}");
                    result.failure = Some(ChunkFailure { chunk_index, cause });
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Replaces every block with air, reusing the chunking of [`run`](Self::run).
    pub fn clear(
        &self,
        channel: &SessionChannel,
        blocks: &[Block],
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ValidationError> {
        let cleared = blocks.iter().map(Block::cleared).collect::<Vec<_>>();
        self.run(channel, &cleared, observer, cancel)
    }

    /// Places `blocks` over several independent channels, one worker thread
    /// per channel.
    ///
    /// Chunks complete in no particular order. Once any chunk fails or the
    /// token is cancelled no further chunks are issued; chunks already sent
    /// are still awaited. The reported failure is the lowest failed chunk.
    pub fn run_pooled(
        &self,
        channels: &[SessionChannel],
        blocks: &[Block],
        observer: &(impl BatchObserver + Sync),
        cancel: &CancelToken,
    ) -> Result<BatchResult, ValidationError> {
        if channels.is_empty() {
            return Err(ValidationError::Empty("channel"));
        }
        let chunks = self.prepare(blocks)?;
        info!(
            "placing {} blocks in {} chunks over {} channels",
            blocks.len(),
            chunks.len(),
            channels.len()
        );

        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let result = Mutex::new(BatchResult::new(blocks.len()));
        let failures = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for (worker, channel) in channels.iter().enumerate() {
                let (next, stop, result, failures, chunks) =
                    (&next, &stop, &result, &failures, &chunks);

                scope.spawn(move || {
                    loop {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        let chunk_index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(chunk) = chunks.get(chunk_index) else {
                            break;
                        };
                        if cancel.is_cancelled() {
                            stop.store(true, Ordering::SeqCst);
                            lock(failures).push(ChunkFailure {
                                chunk_index,
                                cause: FailureCause::Cancelled,
                            });
                            break;
                        }

                        debug!("worker {worker} sending chunk {chunk_index}");
                        lock(result).chunks_sent += 1;
                        match self.dispatch(channel, chunk) {
                            Ok(report) => {
                                let progress = {
                                    let mut result = lock(result);
                                    result.applied += report.applied;
                                    result.rejected += report.rejected;
                                    Progress {
                                        chunk_index,
                                        chunks: chunks.len(),
                                        applied: result.applied,
                                        total: result.total,
                                    }
                                };
                                observer.chunk_completed(&progress);
                            }
                            Err(cause) => {
                                warn!("worker {worker} failed chunk {chunk_index}: {cause:?}");
                                stop.store(true, Ordering::SeqCst);
                                lock(failures).push(ChunkFailure { chunk_index, cause });
                                break;
                            }
                        }
                    }
                });
            }
        });

        let mut result = result.into_inner().unwrap_or_else(PoisonError::into_inner);
        result.failure = failures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .min_by_key(|f| f.chunk_index);
        Ok(result)
    }

    /// Validates and encodes every chunk before anything is sent.
    fn prepare(&self, blocks: &[Block]) -> Result<Vec<Chunk>, ValidationError> {
        validate_blocks(blocks)?;
        blocks
            .chunks(self.chunk_size)
            .map(|chunk| {
                Ok(Chunk {
                    payload: self.encoder.set_blocks(chunk)?,
                    blocks: chunk.len(),
                })
            })
            .collect()
    }

    fn dispatch(&self, channel: &SessionChannel, chunk: &Chunk) -> Result<ChunkReport, FailureCause> {
        let response = channel
            .send(&chunk.payload, self.timeout)
            .map_err(FailureCause::Channel)?;
        let reply = decode_set_blocks(&response, chunk.blocks).map_err(FailureCause::Protocol)?;

        match reply.status {
            Status::Success | Status::PartialSuccess => {
                let applied = reply.value.iter().filter(|o| o.success).count();
                Ok(ChunkReport {
                    applied,
                    rejected: reply.value.len() - applied,
                })
            }
            status @ (Status::AuthenticationFailed | Status::ServerError) => {
                Err(FailureCause::Rejected {
                    status,
                    message: reply.message,
                })
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use bincode::decode_from_slice;

    use super::*;
    use crate::{
        model::Location,
        protocol::{
            ChannelState, Endpoint, Request, StubOptions, StubServer, decoder::decode_get_blocks,
            wire_config,
        },
    };

    fn row(n: i32, id: &str) -> Vec<Block> {
        (0..n).map(|x| Block::new(id, Location::new(x, 64, 0))).collect()
    }

    fn connected(addr: std::net::SocketAddr) -> SessionChannel {
        let channel = SessionChannel::default();
        channel.connect(&Endpoint::from(addr), None).unwrap();
        channel
    }

    #[test]
    fn chunk_count_rounds_up() {
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 10, Duration::from_secs(1));

        assert_eq!(batch.chunk_count(0), 0);
        assert_eq!(batch.chunk_count(10), 1);
        assert_eq!(batch.chunk_count(25), 3);
        assert_eq!(BatchCoordinator::new(&encoder, 0, Duration::ZERO).chunk_size(), 1);
    }

    #[test]
    fn chunks_cover_the_input_in_order() {
        let encoder = RequestEncoder::new("world");
        let cases: [(usize, usize); 7] = [(1, 1), (7, 7), (8, 7), (3, 10), (10, 3), (23, 1), (23, 5)];

        for (n, k) in cases {
            let blocks = row(n as i32, "stone");
            let batch = BatchCoordinator::new(&encoder, k, Duration::from_secs(1));
            let chunks = batch.prepare(&blocks).unwrap();
            assert_eq!(chunks.len(), n.div_ceil(k), "{n} blocks in chunks of {k}");
            assert_eq!(chunks.len(), batch.chunk_count(n));

            let mut sent = Vec::new();
            for chunk in &chunks {
                let (request, _): (Request, usize) =
                    decode_from_slice(chunk.payload.as_bytes(), wire_config()).unwrap();
                let Request::SetBlocks(records) = request else {
                    panic!("expected set-blocks request");
                };
                assert!(records.len() <= k);
                assert_eq!(records.len(), chunk.blocks);
                sent.extend(records.iter().map(|r| r.location.location()));
            }
            let expected = blocks.iter().map(Block::location).collect::<Vec<_>>();
            assert_eq!(sent, expected, "{n} blocks in chunks of {k}");
        }
    }

    #[test]
    fn invalid_sets_fail_before_io() {
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 10, Duration::from_secs(1));
        let channel = SessionChannel::default();

        let err = batch
            .run(&channel, &[], &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err, ValidationError::Empty("block"));

        let mut blocks = row(3, "stone");
        blocks.push(Block::new("", Location::ORIGIN));
        let err = batch
            .run(&channel, &blocks, &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyName { what: "block" });
    }

    #[test]
    fn sends_one_request_per_chunk_and_reports_progress() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 10, Duration::from_secs(5));

        let seen = Mutex::new(Vec::new());
        let observer = |p: &Progress| lock(&seen).push((p.chunk_index, p.applied));
        let result = batch
            .run(&channel, &row(25, "stone"), &observer, &CancelToken::new())
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.applied, 25);
        assert_eq!(result.chunks_sent, 3);
        assert_eq!(stub.stats.set_block_requests(), 3);
        assert_eq!(*lock(&seen), [(0, 10), (1, 20), (2, 25)]);
    }

    #[test]
    fn later_chunks_overwrite_earlier_ones() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 1, Duration::from_secs(5));

        let here = Location::new(3, 70, 3);
        let blocks = [Block::new("stone", here), Block::new("dirt", here)];
        let result = batch
            .run(&channel, &blocks, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(result.applied, 2);

        let response = channel
            .send(&encoder.get_blocks(&[here]).unwrap(), Duration::from_secs(5))
            .unwrap();
        let lookups = decode_get_blocks(&response, &[here]).unwrap().value;
        let block = lookups[0].block.as_ref().unwrap();
        assert_eq!(block.name(), "dirt");
    }

    #[test]
    fn rejected_chunk_stops_the_batch() {
        let stub = StubServer::spawn(StubOptions {
            reject_set_blocks_after: Some(2),
            ..StubOptions::default()
        })
        .unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 3, Duration::from_secs(5));

        let result = batch
            .run(&channel, &row(12, "stone"), &NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(result.applied, 6);
        assert_eq!(result.chunks_sent, 3);
        assert_eq!(result.failed_at(), Some(2));
        let Some(ChunkFailure {
            cause: FailureCause::Rejected { status, message },
            ..
        }) = result.failure
        else {
            panic!("expected a rejected chunk");
        };
        assert_eq!(status, Status::ServerError);
        assert_eq!(message.as_deref(), Some("block placement refused"));
        assert_eq!(stub.stats.set_block_requests(), 3);
        assert_eq!(channel.state(), ChannelState::Ready);
    }

    #[test]
    fn malformed_reply_stops_the_batch() {
        let stub = StubServer::spawn(StubOptions {
            garble_set_blocks_after: Some(1),
            ..StubOptions::default()
        })
        .unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 2, Duration::from_secs(5));

        let result = batch
            .run(&channel, &row(6, "stone"), &NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(result.applied, 2);
        assert_eq!(result.failed_at(), Some(1));
        assert!(matches!(
            result.failure.map(|f| f.cause),
            Some(FailureCause::Protocol(ProtocolError::Undecodable { .. }))
        ));
        assert_eq!(stub.stats.set_block_requests(), 2);
    }

    #[test]
    fn cancelled_token_stops_before_the_first_chunk() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 2, Duration::from_secs(5));

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = batch.run(&channel, &row(4, "stone"), &NoProgress, &cancel).unwrap();

        assert_eq!(result.applied, 0);
        assert_eq!(result.chunks_sent, 0);
        assert_eq!(result.failed_at(), Some(0));
        assert!(matches!(
            result.failure.map(|f| f.cause),
            Some(FailureCause::Cancelled)
        ));
        assert_eq!(stub.stats.set_block_requests(), 0);
    }

    #[test]
    fn cancelling_from_the_observer_stops_between_chunks() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 2, Duration::from_secs(5));

        let cancel = CancelToken::new();
        let observer = |p: &Progress| {
            if p.chunk_index == 1 {
                cancel.cancel();
            }
        };
        let result = batch.run(&channel, &row(8, "stone"), &observer, &cancel).unwrap();

        assert_eq!(result.applied, 4);
        assert_eq!(result.failed_at(), Some(2));
        assert_eq!(stub.stats.set_block_requests(), 2);
    }

    #[test]
    fn clear_writes_air_over_every_block() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channel = connected(stub.addr);
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 3, Duration::from_secs(5));

        let blocks = row(5, "stone");
        batch
            .run(&channel, &blocks, &NoProgress, &CancelToken::new())
            .unwrap();
        let result = batch
            .clear(&channel, &blocks, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(result.applied, 5);

        let locations = blocks.iter().map(Block::location).collect::<Vec<_>>();
        let response = channel
            .send(&encoder.get_blocks(&locations).unwrap(), Duration::from_secs(5))
            .unwrap();
        let lookups = decode_get_blocks(&response, &locations).unwrap().value;
        assert!(lookups.iter().all(|l| l.block.is_none()));
    }

    #[test]
    fn pooled_runs_spread_chunks_over_channels() {
        let stub = StubServer::spawn(StubOptions::default()).unwrap();
        let channels = [connected(stub.addr), connected(stub.addr)];
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 4, Duration::from_secs(5));

        let calls = AtomicUsize::new(0);
        let observer = |_: &Progress| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let result = batch
            .run_pooled(&channels, &row(30, "stone"), &observer, &CancelToken::new())
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.applied, 30);
        assert_eq!(result.chunks_sent, 8);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(stub.stats.blocks_written(), 30);
    }

    #[test]
    fn pooled_failure_stops_new_chunks_and_reports_the_lowest() {
        let stub = StubServer::spawn(StubOptions {
            stall_set_blocks_after: Some(0),
            stall_for: Duration::from_secs(2),
            ..StubOptions::default()
        })
        .unwrap();
        let channels = [connected(stub.addr), connected(stub.addr)];
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 2, Duration::from_millis(300));

        let result = batch
            .run_pooled(&channels, &row(10, "stone"), &NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(result.applied, 0);
        assert_eq!(result.chunks_sent, 2);
        assert_eq!(result.failed_at(), Some(0));
        assert!(matches!(
            result.failure.map(|f| f.cause),
            Some(FailureCause::Channel(ChannelError::Timeout(_)))
        ));
        assert_eq!(stub.stats.set_block_requests(), 2);
        assert!(channels.iter().all(|c| c.state() == ChannelState::Disconnected));
    }

    #[test]
    fn pooled_runs_need_a_channel() {
        let encoder = RequestEncoder::new("world");
        let batch = BatchCoordinator::new(&encoder, 4, Duration::from_secs(5));

        let err = batch
            .run_pooled(&[], &row(3, "stone"), &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err, ValidationError::Empty("channel"));
    }
}
