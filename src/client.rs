//! High level entry point.
//!
//! [`Client`] ties a [`SessionChannel`] to a [`RequestEncoder`] and the
//! decoders. Every request method returns `Ok(Reply)` when the server
//! answered, even if the answer is a rejection: check [`Reply::status`].
//! `Err` is reserved for bad input, a failed handshake, a lost or timed-out
//! connection, or a reply that does not parse.
use std::time::Duration;

use log::info;

use crate::{
    batch::{BatchCoordinator, BatchObserver, BatchResult, CancelToken},
    command::Command,
    config::ClientConfig,
    error::{ClientError, ProtocolError},
    model::{Block, Location, Player},
    protocol::{
        BlockLookup, BlockOutcome, ChannelState, CommandOutcome, Credentials, Operation, Reply,
        RequestEncoder, ResponsePayload, SessionChannel,
        decoder::{decode_ack, decode_commands, decode_get_blocks, decode_players, decode_set_blocks},
    },
    source::{BlockSource, blocks_from_source},
};

pub struct Client {
    channel: SessionChannel,
    encoder: RequestEncoder,
    config: ClientConfig,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            channel: SessionChannel::new(config.connect_timeout, config.max_frame),
            encoder: RequestEncoder::new(config.world.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Connects and authenticates; a no-op while a session is live.
    pub fn connect(&self, credentials: Option<&Credentials>) -> Result<(), ClientError> {
        Ok(self.channel.connect(&self.config.endpoint(), credentials)?)
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn ping(&self) -> Result<Reply<()>, ClientError> {
        self.request(Operation::Ping, None, decode_ack)
    }

    /// Runs one command. The reply still holds a list, with one outcome.
    pub fn execute_command(
        &self,
        command: impl Into<Command>,
    ) -> Result<Reply<Vec<CommandOutcome>>, ClientError> {
        self.execute_commands(&[command.into()])
    }

    /// Runs `commands` in order, one outcome per command.
    pub fn execute_commands(
        &self,
        commands: &[Command],
    ) -> Result<Reply<Vec<CommandOutcome>>, ClientError> {
        self.request(Operation::ExecuteCommands(commands), None, |payload| {
            decode_commands(payload, commands.len())
        })
    }

    pub fn set_block(&self, block: &Block) -> Result<Reply<Vec<BlockOutcome>>, ClientError> {
        self.set_blocks(std::slice::from_ref(block), None)
    }

    /// Sends every block in a single request.
    ///
    /// No chunking happens here; use [`run_batch`](Self::run_batch) for large
    /// sets. `timeout` overrides the configured request timeout.
    pub fn set_blocks(
        &self,
        blocks: &[Block],
        timeout: Option<Duration>,
    ) -> Result<Reply<Vec<BlockOutcome>>, ClientError> {
        self.request(Operation::SetBlocks(blocks), timeout, |payload| {
            decode_set_blocks(payload, blocks.len())
        })
    }

    /// Block at `location`, `None` for air.
    pub fn get_block(&self, location: Location) -> Result<Reply<Option<Block>>, ClientError> {
        Ok(self
            .get_blocks(&[location])?
            .map(|lookups| lookups.into_iter().next().and_then(|l| l.block)))
    }

    pub fn get_blocks(
        &self,
        locations: &[Location],
    ) -> Result<Reply<Vec<BlockLookup>>, ClientError> {
        self.request(Operation::GetBlocks(locations), None, |payload| {
            decode_get_blocks(payload, locations)
        })
    }

    pub fn get_players(&self, only_online: bool) -> Result<Reply<Vec<Player>>, ClientError> {
        self.request(Operation::GetPlayers { only_online }, None, decode_players)
    }

    pub fn batch(&self) -> BatchCoordinator<'_> {
        BatchCoordinator::new(
            &self.encoder,
            self.config.chunk_size,
            self.config.request_timeout,
        )
    }

    /// Places `blocks` in chunks of the configured size.
    pub fn run_batch(
        &self,
        blocks: &[Block],
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ClientError> {
        Ok(self.batch().run(&self.channel, blocks, observer, cancel)?)
    }

    /// Sets every location in `blocks` to air.
    pub fn clear_blocks(
        &self,
        blocks: &[Block],
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ClientError> {
        Ok(self.batch().clear(&self.channel, blocks, observer, cancel)?)
    }

    /// Builds everything `source` yields with its origin at `origin`.
    pub fn place_source(
        &self,
        source: &dyn BlockSource,
        origin: Location,
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ClientError> {
        let blocks = blocks_from_source(source, origin)?;
        self.run_batch(&blocks, observer, cancel)
    }

    /// Clears the region a previous [`place_source`](Self::place_source) built.
    pub fn clear_source(
        &self,
        source: &dyn BlockSource,
        origin: Location,
        observer: &impl BatchObserver,
        cancel: &CancelToken,
    ) -> Result<BatchResult, ClientError> {
        let blocks = blocks_from_source(source, origin)?;
        self.clear_blocks(&blocks, observer, cancel)
    }

    /// Places `blocks` over `connections` extra sessions opened for the run.
    ///
    /// The session owned by this client is not used. Chunks land in no
    /// particular order, so overlapping blocks have no defined winner.
    pub fn run_pooled(
        &self,
        blocks: &[Block],
        connections: usize,
        credentials: Option<&Credentials>,
        observer: &(impl BatchObserver + Sync),
        cancel: &CancelToken,
    ) -> Result<BatchResult, ClientError> {
        let endpoint = self.config.endpoint();
        let channels = (0..connections.max(1))
            .map(|_| SessionChannel::new(self.config.connect_timeout, self.config.max_frame))
            .collect::<Vec<_>>();

        let opened = channels
            .iter()
            .try_for_each(|channel| channel.connect(&endpoint, credentials));
        let result = match opened {
            Ok(()) => {
                info!("opened {} pooled sessions to {endpoint}", channels.len());
                self.batch()
                    .run_pooled(&channels, blocks, observer, cancel)
                    .map_err(ClientError::from)
            }
            Err(e) => Err(e.into()),
        };

        channels.iter().for_each(SessionChannel::close);
        result
    }

    fn request<T>(
        &self,
        operation: Operation<'_>,
        timeout: Option<Duration>,
        decode: impl FnOnce(&ResponsePayload) -> Result<Reply<T>, ProtocolError>,
    ) -> Result<Reply<T>, ClientError> {
        let payload = self.encoder.encode(operation)?;
        let response = self
            .channel
            .send(&payload, timeout.unwrap_or(self.config.request_timeout))?;
        Ok(decode(&response)?)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.channel.close();
    }
}
