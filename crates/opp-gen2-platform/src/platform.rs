//! The OPP platform: chains, tasks and the switch capability.

use std::collections::BTreeMap;
use std::sync::Arc;

use opp_gen2_protocol::{FirmwareVersion, ResyncEvent, Resynchronizer};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelKey, ChannelResolver};
use crate::config::{OppConfig, SwitchConfig};
use crate::dispatch::{Phase, SwitchTransition};
use crate::error::{PlatformError, PlatformResult};
use crate::handshake::Handshake;
use crate::ports::{SwitchPlatform, SwitchStateTracker};
use crate::registry::{BoardInfo, CardCounts, ChainState, Registry};
use crate::transport::{ChainReader, ChainWriter, Transport};

/// A configured switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchHandle {
    pub key: ChannelKey,
    pub invert: bool,
}

impl SwitchHandle {
    pub fn number(&self) -> String {
        self.key.to_string()
    }
}

#[derive(Default)]
struct Tasks {
    chains: Vec<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    lamp: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    pub(crate) config: OppConfig,
    pub(crate) registry: Mutex<Registry>,
    writers: RwLock<BTreeMap<String, ChainWriter>>,
    tasks: Mutex<Tasks>,
    tracker: Arc<dyn SwitchStateTracker>,
}

/// Host driver for any number of OPP chains. Cheap to clone.
#[derive(Clone)]
pub struct OppPlatform {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for OppPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OppPlatform")
            .field("chains", &self.chains())
            .finish()
    }
}

impl OppPlatform {
    /// Creates a platform with no chains connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: OppConfig, tracker: Arc<dyn SwitchStateTracker>) -> PlatformResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(Registry::new()),
                writers: RwLock::new(BTreeMap::new()),
                tasks: Mutex::new(Tasks::default()),
                tracker,
            }),
        })
    }

    pub fn config(&self) -> &OppConfig {
        &self.inner.config
    }

    /// Runs the handshake on `transport` and starts reading from it.
    ///
    /// On failure the chain is forgotten and its writer stopped.
    ///
    /// # Errors
    ///
    /// Returns the handshake error. Every such error is fatal for the chain.
    pub async fn connect<T: Transport>(&self, chain: &str, transport: T) -> PlatformResult<()> {
        self.inner.registry.lock().begin_chain(chain)?;

        let (read_half, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = ChainWriter::spawn(chain, write_half);
        let mut reader = ChainReader::new(chain, read_half, self.inner.config.response_timeout());
        let mut resync = Resynchronizer::new();

        let handshake = Handshake {
            chain,
            config: &self.inner.config,
            registry: &self.inner.registry,
            writer: &writer,
        };
        if let Err(err) = handshake.run(&mut reader, &mut resync).await {
            error!(chain, %err, "handshake failed");
            writer_task.abort();
            self.inner.registry.lock().forget_chain(chain);
            return Err(err);
        }

        resync.push(&reader.take_buffered());
        self.inner
            .writers
            .write()
            .insert(chain.to_string(), writer);
        let reader_task = tokio::spawn(read_loop(self.clone(), reader, resync));
        self.inner
            .tasks
            .lock()
            .chains
            .extend([writer_task, reader_task]);
        info!(chain, "chain connected");
        Ok(())
    }

    /// Starts polling inputs on every connected chain.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn initialize(&self) -> PlatformResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_no_runtime| PlatformError::NoRuntime("input poll task"))?;
        let mut tasks = self.inner.tasks.lock();
        if tasks.poll.is_none() {
            tasks.poll = Some(runtime.spawn(crate::poll::poll_inputs(self.clone())));
            info!(chains = ?self.chains(), "input polling started");
        }
        Ok(())
    }

    pub(crate) fn ensure_lamp_task(&self) -> PlatformResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_no_runtime| PlatformError::NoRuntime("lamp update task"))?;
        let mut tasks = self.inner.tasks.lock();
        if tasks.lamp.is_none() {
            tasks.lamp = Some(runtime.spawn(crate::poll::update_lamps(self.clone())));
            debug!("lamp updates started");
        }
        Ok(())
    }

    /// Stops every task and disconnects every chain.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock();
            let mut handles: Vec<_> = tasks.poll.take().into_iter().collect();
            handles.extend(tasks.lamp.take());
            handles.append(&mut tasks.chains);
            handles
        };
        self.inner.writers.write().clear();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => error!(%err, "task failed during shutdown"),
            }
        }
        info!("platform stopped");
    }

    pub(crate) fn writer(&self, chain: &str) -> PlatformResult<ChainWriter> {
        self.inner
            .writers
            .read()
            .get(chain)
            .cloned()
            .ok_or_else(|| PlatformError::NotConnected(chain.to_string()))
    }

    fn writers(&self) -> Vec<ChainWriter> {
        self.inner.writers.read().values().cloned().collect()
    }

    /// Waits until every frame queued so far has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if a chain's writer has stopped.
    pub async fn drain(&self) -> PlatformResult<()> {
        for writer in self.writers() {
            writer.drain().await?;
        }
        Ok(())
    }

    /// Resolves a host identifier against the connected chains.
    pub(crate) fn resolve(&self, kind: &'static str, number: &str) -> PlatformResult<ChannelKey> {
        let chains = self.inner.registry.lock().ready_chain_ids();
        if chains.is_empty() {
            return Err(PlatformError::NotConnected(number.to_string()));
        }
        ChannelResolver::new(&self.inner.config.chains, &chains).resolve(kind, number)
    }

    /// Connected chain ids.
    pub fn chains(&self) -> Vec<String> {
        self.inner.registry.lock().chain_ids()
    }

    /// Snapshot of a chain's handshake results.
    pub fn chain_state(&self, chain: &str) -> Option<ChainState> {
        self.inner.registry.lock().chain(chain).cloned()
    }

    pub fn boards(&self, chain: &str) -> Vec<BoardInfo> {
        self.inner
            .registry
            .lock()
            .chain(chain)
            .map(|c| c.boards.clone())
            .unwrap_or_default()
    }

    pub fn card_counts(&self, chain: &str) -> CardCounts {
        self.inner.registry.lock().card_counts(chain)
    }

    /// Lowest firmware version on `chain`.
    pub fn firmware_version(&self, chain: &str) -> Option<FirmwareVersion> {
        self.inner
            .registry
            .lock()
            .chain(chain)
            .and_then(|c| c.min_version)
    }

    /// Records dropped for a CRC failure since start.
    pub fn bad_crc_count(&self) -> u64 {
        self.inner.registry.lock().bad_crc_count()
    }

    /// Carves records out of `resync` and reports the resulting edges.
    pub(crate) fn process_stream(&self, chain: &str, resync: &mut Resynchronizer) {
        let transitions: Vec<SwitchTransition> = {
            let mut registry = self.inner.registry.lock();
            let mut transitions = Vec::new();
            while let Some(event) = resync.next_event() {
                match event {
                    ResyncEvent::Record(record) => {
                        match registry.dispatch(chain, record.as_bytes(), Phase::Running) {
                            Ok(outcome) => {
                                if outcome.lost_sync {
                                    resync.lost_sync();
                                }
                                transitions.extend(outcome.transitions);
                            }
                            Err(err) => warn!(chain, %err, "dropping input record"),
                        }
                    }
                    ResyncEvent::EndOfMessage => {}
                    ResyncEvent::Discarded(count) => {
                        warn!(chain, count, "resynchronizing input stream");
                    }
                }
            }
            transitions
        };
        for transition in transitions {
            self.inner.tracker.process_switch_by_num(
                &transition.key.to_string(),
                u8::from(transition.active),
                self,
            );
        }
    }
}

async fn read_loop<R>(platform: OppPlatform, mut reader: ChainReader<R>, mut resync: Resynchronizer)
where
    R: AsyncRead + Unpin,
{
    let chain = reader.chain().to_string();
    platform.process_stream(&chain, &mut resync);
    loop {
        match reader.read_chunk().await {
            Ok(bytes) => {
                resync.push(&bytes);
                platform.process_stream(&chain, &mut resync);
            }
            Err(err) => {
                error!(chain, %err, "chain reader stopped");
                break;
            }
        }
    }
}

impl SwitchPlatform for OppPlatform {
    fn configure_switch(&self, config: &SwitchConfig) -> PlatformResult<SwitchHandle> {
        let key = self.resolve("switch", &config.number)?;
        if !self.inner.registry.lock().has_switch(&key) {
            return Err(PlatformError::UnknownChannel {
                kind: "switch",
                number: config.number.clone(),
            });
        }
        Ok(SwitchHandle {
            key,
            invert: config.invert,
        })
    }

    fn get_hw_switch_states(&self) -> BTreeMap<String, u8> {
        self.inner.registry.lock().hw_switch_states()
    }
}
