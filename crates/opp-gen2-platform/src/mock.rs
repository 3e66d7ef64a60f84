//! Scripted fake chain for tests.
//!
//! [`ScriptedChain`] plays the board side of the protocol over an in-memory
//! duplex stream. Responses are queued per request frame and flushed, with a
//! terminator, when the host sends an end-of-message byte.

use std::sync::Arc;

use opp_gen2_protocol::commands::{
    CFG_IND_SOL_CMD, CHNG_NEO_CMD, CHNG_NEO_COLOR_TBL, EOM_CMD, GET_GEN2_CFG, GET_VERS_CMD,
    INCAND_CMD, INV_CMD, KICK_SOL_CMD, READ_GEN2_INP_CMD, READ_MATRIX_INP, SET_SOL_INP_CMD,
};
use opp_gen2_protocol::{FrameBuilder, is_gen2_address};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::trace;

const DUPLEX_CAPACITY: usize = 4096;

/// One simulated board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedBoard {
    pub addr: u8,
    pub wings: [u8; 4],
    pub version: u32,
    /// Digital input word, active-low.
    pub inputs: u32,
    pub matrix: [u32; 2],
}

impl ScriptedBoard {
    /// A board on firmware 0.2.0.0 with every input open.
    pub fn new(addr: u8, wings: [u8; 4]) -> Self {
        Self {
            addr,
            wings,
            version: 0x0002_0000,
            inputs: u32::MAX,
            matrix: [u32::MAX; 2],
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    fn respond(&self, cmd: u8) -> Option<Vec<u8>> {
        let mut builder = FrameBuilder::new();
        builder.begin(self.addr, cmd);
        match cmd {
            GET_GEN2_CFG => builder.write_bytes(&self.wings),
            GET_VERS_CMD => builder.write_u32_be(self.version),
            READ_GEN2_INP_CMD => builder.write_u32_be(self.inputs),
            READ_MATRIX_INP => {
                let [bank0, bank1] = self.matrix;
                builder.write_u32_be(bank0).write_u32_be(bank1)
            }
            _ => return None,
        };
        builder.finish();
        Some(builder.into_inner())
    }
}

/// Length of a host request frame, including its CRC.
fn request_len(cmd: u8) -> Option<usize> {
    match cmd {
        GET_VERS_CMD | KICK_SOL_CMD | READ_GEN2_INP_CMD | GET_GEN2_CFG | CFG_IND_SOL_CMD
        | CHNG_NEO_COLOR_TBL => Some(7),
        CHNG_NEO_CMD | SET_SOL_INP_CMD => Some(5),
        INCAND_CMD => Some(8),
        READ_MATRIX_INP => Some(11),
        _ => None,
    }
}

/// A defect injected into one board response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFault {
    /// The record's CRC byte is flipped.
    BadCrc,
    /// A stray byte follows the record.
    TrailingByte(u8),
}

#[derive(Debug, Default)]
struct ChainState {
    boards: Vec<ScriptedBoard>,
    frames: Vec<Vec<u8>>,
    silent: bool,
    /// Pending faults keyed by board address and command.
    faults: Vec<(u8, u8, ResponseFault)>,
}

impl ChainState {
    fn board(&self, addr: u8) -> Option<&ScriptedBoard> {
        self.boards.iter().find(|b| b.addr == addr)
    }

    fn board_mut(&mut self, addr: u8) -> Option<&mut ScriptedBoard> {
        self.boards.iter_mut().find(|b| b.addr == addr)
    }

    fn take_fault(&mut self, addr: u8, cmd: u8) -> Option<ResponseFault> {
        let index = self
            .faults
            .iter()
            .position(|&(a, c, _)| a == addr && c == cmd)?;
        Some(self.faults.remove(index).2)
    }

    /// Consumes as many complete requests from `buffer` as possible and
    /// returns bytes to send back.
    fn process(&mut self, buffer: &mut Vec<u8>, pending: &mut Vec<u8>) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let Some(&first) = buffer.first() else {
                break;
            };
            if first == EOM_CMD {
                buffer.drain(..1);
                out.append(pending);
                out.push(EOM_CMD);
                continue;
            }
            if first == INV_CMD {
                buffer.drain(..1);
                self.frames.push(vec![INV_CMD]);
                pending.push(INV_CMD);
                pending.extend(self.boards.iter().map(|b| b.addr));
                continue;
            }
            if !is_gen2_address(first) {
                buffer.drain(..1);
                continue;
            }
            let Some(&cmd) = buffer.get(1) else {
                break;
            };
            let Some(len) = request_len(cmd) else {
                buffer.drain(..1);
                continue;
            };
            if buffer.len() < len {
                break;
            }
            let frame: Vec<u8> = buffer.drain(..len).collect();
            self.frames.push(frame);
            if let Some(mut response) = self.board(first).and_then(|b| b.respond(cmd)) {
                match self.take_fault(first, cmd) {
                    Some(ResponseFault::BadCrc) => {
                        if let Some(crc) = response.last_mut() {
                            *crc ^= 0x55;
                        }
                    }
                    Some(ResponseFault::TrailingByte(byte)) => response.push(byte),
                    None => {}
                }
                pending.extend(response);
            }
        }
        out
    }
}

/// Board side of a simulated chain.
pub struct ScriptedChain {
    state: Arc<Mutex<ChainState>>,
    task: JoinHandle<()>,
}

impl ScriptedChain {
    /// Starts the simulation and returns the host end of the link.
    pub fn spawn(boards: Vec<ScriptedBoard>) -> (Self, DuplexStream) {
        Self::start(ChainState {
            boards,
            ..ChainState::default()
        })
    }

    /// A chain that never answers.
    pub fn silent() -> (Self, DuplexStream) {
        Self::start(ChainState {
            silent: true,
            ..ChainState::default()
        })
    }

    fn start(state: ChainState) -> (Self, DuplexStream) {
        let (host, board) = tokio::io::duplex(DUPLEX_CAPACITY);
        let state = Arc::new(Mutex::new(state));
        let task = tokio::spawn(run(board, Arc::clone(&state)));
        (Self { state, task }, host)
    }

    /// Sets the digital input word of `addr`. Bits are active-low.
    pub fn set_inputs(&self, addr: u8, inputs: u32) {
        if let Some(board) = self.state.lock().board_mut(addr) {
            board.inputs = inputs;
        }
    }

    pub fn set_matrix(&self, addr: u8, matrix: [u32; 2]) {
        if let Some(board) = self.state.lock().board_mut(addr) {
            board.matrix = matrix;
        }
    }

    /// Flips the CRC of the next digital input response of every board.
    pub fn corrupt_next_input(&self) {
        let mut state = self.state.lock();
        let addrs: Vec<u8> = state.boards.iter().map(|b| b.addr).collect();
        state.faults.extend(
            addrs
                .into_iter()
                .map(|addr| (addr, READ_GEN2_INP_CMD, ResponseFault::BadCrc)),
        );
    }

    /// Applies `fault` to the next answer of board `addr` to `cmd`.
    pub fn fault_next(&self, addr: u8, cmd: u8, fault: ResponseFault) {
        self.state.lock().faults.push((addr, cmd, fault));
    }

    /// Every request frame received so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().frames.clone()
    }

    /// Received request frames carrying `cmd`.
    pub fn frames_with_command(&self, cmd: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|f| f.get(1) == Some(&cmd))
            .cloned()
            .collect()
    }
}

impl Drop for ScriptedChain {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(mut stream: DuplexStream, state: Arc<Mutex<ChainState>>) {
    let mut buffer = Vec::new();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(chunk.get(..n).unwrap_or_default());
        let out = {
            let mut state = state.lock();
            if state.silent {
                buffer.clear();
                continue;
            }
            state.process(&mut buffer, &mut pending)
        };
        if out.is_empty() {
            continue;
        }
        trace!(bytes = out.len(), "scripted chain reply");
        if stream.write_all(&out).await.is_err() {
            return;
        }
    }
}
