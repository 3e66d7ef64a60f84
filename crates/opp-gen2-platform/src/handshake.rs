//! Chain bring-up.
//!
//! Flush, probe, inventory, per-board configuration, firmware versions and
//! an initial input snapshot, in that order. A garbled configuration or
//! version answer is logged and the line resynchronized; transport failures,
//! unusable firmware and a garbled initial snapshot abort the chain.

use opp_gen2_protocol::commands::{CONFIG_RECORD_LEN, EOM_CMD};
use opp_gen2_protocol::{
    Command, FirmwareVersion, ResyncEvent, Resynchronizer, build_get_config, build_get_version,
    build_inventory, hex_dump, is_gen2_address,
};
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::config::OppConfig;
use crate::dispatch::Phase;
use crate::error::{PlatformError, PlatformResult};
use crate::registry::Registry;
use crate::transport::{ChainReader, ChainWriter};

/// Stray terminators tolerated ahead of a response. Late probe echoes land
/// here.
const MAX_LEADING_TERMINATORS: usize = 16;
/// Bytes drained per read while flushing the line.
const FLUSH_READ: usize = 1000;
/// Bytes read per probe attempt.
const PROBE_READ: usize = 30;

pub(crate) struct Handshake<'a> {
    pub(crate) chain: &'a str,
    pub(crate) config: &'a OppConfig,
    pub(crate) registry: &'a Mutex<Registry>,
    pub(crate) writer: &'a ChainWriter,
}

impl Handshake<'_> {
    pub(crate) async fn run<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        resync: &mut Resynchronizer,
    ) -> PlatformResult<()> {
        self.flush(reader).await?;
        self.probe(reader).await?;
        let addrs = self.inventory(reader).await?;
        if addrs.is_empty() {
            warn!(chain = self.chain, "no OPP boards found on chain");
        } else {
            self.configure_boards(reader, resync, &addrs).await?;
            self.query_versions(reader, resync, &addrs).await?;
            self.initial_snapshot(reader, resync).await?;
        }

        let mut registry = self.registry.lock();
        registry.chain_mut(self.chain)?.ready = true;
        let counts = registry.card_counts(self.chain);
        info!(
            chain = self.chain,
            boards = addrs.len(),
            solenoid = counts.solenoid,
            input = counts.input,
            matrix = counts.matrix,
            incand = counts.incand,
            neopixel = counts.neopixel,
            "chain ready"
        );
        Ok(())
    }

    async fn flush<R: AsyncRead + Unpin>(&self, reader: &mut ChainReader<R>) -> PlatformResult<()> {
        self.writer.send_and_drain(vec![EOM_CMD]).await?;
        for _ in 0..self.config.probe_attempts {
            let junk = reader
                .read_within(self.config.probe_interval(), FLUSH_READ)
                .await?;
            if junk.is_empty() {
                break;
            }
            debug!(chain = self.chain, bytes = %hex_dump(&junk), "flushed");
        }
        Ok(())
    }

    async fn probe<R: AsyncRead + Unpin>(&self, reader: &mut ChainReader<R>) -> PlatformResult<()> {
        for attempt in 1..=self.config.probe_attempts {
            self.writer.send_and_drain(vec![EOM_CMD]).await?;
            let resp = reader
                .read_within(self.config.probe_interval(), PROBE_READ)
                .await?;
            if resp.first() == Some(&EOM_CMD) {
                debug!(chain = self.chain, attempt, "hardware answered probe");
                return Ok(());
            }
            if !resp.is_empty() {
                debug!(chain = self.chain, attempt, bytes = %hex_dump(&resp), "unexpected probe response");
            }
        }
        Err(PlatformError::NoResponse {
            chain: self.chain.to_string(),
            attempts: self.config.probe_attempts,
        })
    }

    async fn inventory<R: AsyncRead + Unpin>(&self, reader: &mut ChainReader<R>) -> PlatformResult<Vec<u8>> {
        self.writer.send_and_drain(build_inventory()).await?;
        let mut msg = reader.read_until(EOM_CMD, "inventory").await?;
        let mut skipped = 0;
        while msg == [EOM_CMD] && skipped < MAX_LEADING_TERMINATORS {
            msg = reader.read_until(EOM_CMD, "inventory").await?;
            skipped += 1;
        }
        if Command::classify(&msg) != Command::Inventory {
            return Err(self.malformed("inventory", &msg));
        }
        self.registry
            .lock()
            .dispatch(self.chain, &msg, Phase::Initial)?;
        Ok(self
            .registry
            .lock()
            .chain(self.chain)
            .map(|c| c.boards.iter().map(|b| b.addr).collect())
            .unwrap_or_default())
    }

    /// Reads concatenated fixed-size records until a terminator or a byte
    /// that cannot start another record.
    async fn read_records<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        step: &'static str,
        max_records: usize,
    ) -> PlatformResult<Vec<u8>> {
        let mut first = reader.read_byte(step).await?;
        let mut skipped = 0;
        while first == EOM_CMD && skipped < MAX_LEADING_TERMINATORS {
            first = reader.read_byte(step).await?;
            skipped += 1;
        }
        let mut msg = vec![first];
        for _ in 0..max_records {
            msg.extend(reader.read_exact(CONFIG_RECORD_LEN - 1, step).await?);
            let next = reader.read_byte(step).await?;
            msg.push(next);
            if next == EOM_CMD || !is_gen2_address(next) {
                break;
            }
        }
        Ok(msg)
    }

    fn malformed(&self, step: &'static str, msg: &[u8]) -> PlatformError {
        PlatformError::MalformedResponse {
            chain: self.chain.to_string(),
            step,
            detail: hex_dump(msg).to_string(),
        }
    }

    /// Drops the rest of a garbled answer, up to and including its
    /// terminator or until the line goes quiet.
    async fn skip_to_terminator<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
    ) -> PlatformResult<()> {
        loop {
            let junk = reader
                .read_within(self.config.probe_interval(), FLUSH_READ)
                .await?;
            if !junk.is_empty() {
                debug!(chain = self.chain, bytes = %hex_dump(&junk), "skipped");
            }
            if junk.is_empty() || junk.contains(&EOM_CMD) {
                return Ok(());
            }
        }
    }

    async fn records_step<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        resync: &mut Resynchronizer,
        step: &'static str,
        request: Vec<u8>,
        expected: usize,
    ) -> PlatformResult<()> {
        self.writer.send_and_drain(request).await?;
        let msg = self.read_records(reader, step, expected).await?;
        let outcome = self
            .registry
            .lock()
            .dispatch(self.chain, &msg, Phase::Initial)?;
        if outcome.lost_sync {
            warn!(
                chain = self.chain,
                step,
                records = outcome.records,
                msg = %hex_dump(&msg),
                "resynchronizing after malformed response"
            );
            resync.lost_sync();
            if msg.last() != Some(&EOM_CMD) {
                self.skip_to_terminator(reader).await?;
            }
        }
        if outcome.records != expected {
            warn!(
                chain = self.chain,
                step,
                expected,
                received = outcome.records,
                "boards missing from response"
            );
        }
        Ok(())
    }

    async fn configure_boards<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        resync: &mut Resynchronizer,
        addrs: &[u8],
    ) -> PlatformResult<()> {
        self.records_step(reader, resync, "configuration", build_get_config(addrs), addrs.len())
            .await
    }

    async fn query_versions<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        resync: &mut Resynchronizer,
        addrs: &[u8],
    ) -> PlatformResult<()> {
        self.records_step(reader, resync, "version", build_get_version(addrs), addrs.len())
            .await?;
        let min_version = self
            .registry
            .lock()
            .chain(self.chain)
            .and_then(|c| c.min_version);
        match min_version {
            Some(found) if !found.is_supported() => Err(PlatformError::FirmwareTooOld {
                chain: self.chain.to_string(),
                required: FirmwareVersion::MIN_SUPPORTED,
                found,
            }),
            Some(found) => {
                info!(chain = self.chain, version = %found, "chain firmware");
                Ok(())
            }
            None => Err(self.malformed("version", &[])),
        }
    }

    async fn initial_snapshot<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ChainReader<R>,
        resync: &mut Resynchronizer,
    ) -> PlatformResult<()> {
        let (request, expected) = {
            let registry = self.registry.lock();
            registry
                .chain(self.chain)
                .map(|c| (c.read_input_msg.clone(), c.switch_cards))
                .unwrap_or_default()
        };
        if expected == 0 {
            return Ok(());
        }

        self.writer.send_and_drain(request).await?;
        let mut received = 0;
        while received < expected {
            let chunk = reader.read_chunk_timed("initial input").await?;
            resync.push(&chunk);
            while let Some(event) = resync.next_event() {
                match event {
                    ResyncEvent::Record(record) => {
                        self.registry
                            .lock()
                            .dispatch(self.chain, record.as_bytes(), Phase::Initial)?;
                        received += 1;
                    }
                    ResyncEvent::EndOfMessage => {}
                    ResyncEvent::Discarded(count) => {
                        return Err(PlatformError::MalformedResponse {
                            chain: self.chain.to_string(),
                            step: "initial input",
                            detail: format!("{count} unexpected bytes"),
                        });
                    }
                }
            }
        }
        debug!(chain = self.chain, records = received, "initial switch states read");
        Ok(())
    }
}
