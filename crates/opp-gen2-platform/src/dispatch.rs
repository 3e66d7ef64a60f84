//! Inbound message dispatch.
//!
//! Messages are classified by [`Command::classify`] and routed to the
//! matching handler. Input records are handled differently during the
//! handshake ([`Phase::Initial`]), where they only seed the baseline, and once
//! the chain is ready ([`Phase::Running`]), where they are diffed.

use opp_gen2_protocol::{
    Command, InputRecord, MatrixRecord, ProtocolError, RecordSequence, SequenceEnd, hex_dump,
    parse_config_response, parse_inventory, parse_version_response,
};
use tracing::{debug, warn};

use crate::channel::ChannelKey;
use crate::error::{PlatformError, PlatformResult};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Running,
}

/// A switch edge to report to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchTransition {
    pub key: ChannelKey,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub transitions: Vec<SwitchTransition>,
    /// Records accepted by the handler.
    pub records: usize,
    /// The chain's stream must be resynchronized.
    pub lost_sync: bool,
}

impl Registry {
    /// Routes one inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error for conditions that abort the handshake: a
    /// malformed initial input record, a malformed inventory or a
    /// pre-release firmware version.
    pub fn dispatch(&mut self, chain: &str, msg: &[u8], phase: Phase) -> PlatformResult<DispatchOutcome> {
        let command = Command::classify(msg);
        debug!(chain, ?command, msg = %hex_dump(msg), "received");
        match command {
            Command::Inventory => self.inventory_response(chain, msg),
            Command::EndOfMessage => Ok(DispatchOutcome::default()),
            Command::GetConfig => self.config_response(chain, msg),
            Command::GetVersion => self.version_response(chain, msg),
            Command::ReadInputs => self.input_response(chain, msg, phase),
            Command::ReadMatrix => self.matrix_response(chain, msg, phase),
            _ => {
                warn!(chain, msg = %hex_dump(msg), "unknown command in received message");
                Ok(DispatchOutcome {
                    lost_sync: true,
                    ..DispatchOutcome::default()
                })
            }
        }
    }

    fn inventory_response(&mut self, chain: &str, msg: &[u8]) -> PlatformResult<DispatchOutcome> {
        let addrs = parse_inventory(msg).map_err(|err| PlatformError::MalformedResponse {
            chain: chain.to_string(),
            step: "inventory",
            detail: err.to_string(),
        })?;
        self.record_inventory(chain, &addrs)?;
        Ok(DispatchOutcome {
            records: addrs.len(),
            ..DispatchOutcome::default()
        })
    }

    fn sequence_end<T>(&mut self, chain: &str, seq: &RecordSequence<T>, msg: &[u8]) -> bool {
        match seq.end {
            SequenceEnd::Terminated => false,
            SequenceEnd::BadCrc { offset } => {
                self.bad_crc += 1;
                warn!(chain, offset, msg = %hex_dump(msg), "record contains bad CRC");
                false
            }
            SequenceEnd::Short { offset } | SequenceEnd::Malformed { offset } => {
                warn!(chain, offset, msg = %hex_dump(msg), "malformed record sequence");
                true
            }
        }
    }

    fn config_response(&mut self, chain: &str, msg: &[u8]) -> PlatformResult<DispatchOutcome> {
        let seq = parse_config_response(msg);
        for record in &seq.records {
            self.register_board(chain, record)?;
        }
        let lost_sync = self.sequence_end(chain, &seq, msg);
        self.log_read_message(chain);
        Ok(DispatchOutcome {
            records: seq.records.len(),
            lost_sync,
            ..DispatchOutcome::default()
        })
    }

    fn version_response(&mut self, chain: &str, msg: &[u8]) -> PlatformResult<DispatchOutcome> {
        let seq = parse_version_response(msg);
        for record in &seq.records {
            self.record_version(chain, record)?;
        }
        let lost_sync = self.sequence_end(chain, &seq, msg);
        Ok(DispatchOutcome {
            records: seq.records.len(),
            lost_sync,
            ..DispatchOutcome::default()
        })
    }

    /// Shared handling of record errors. A CRC failure is counted and the
    /// record dropped; a short record aborts the handshake or, once running,
    /// forces a resync.
    fn record_error(
        &mut self,
        chain: &str,
        msg: &[u8],
        phase: Phase,
        err: ProtocolError,
    ) -> PlatformResult<DispatchOutcome> {
        match err {
            ProtocolError::CrcMismatch { .. } => {
                self.bad_crc += 1;
                warn!(chain, msg = %hex_dump(msg), "msg contains bad CRC");
                Ok(DispatchOutcome::default())
            }
            err if phase == Phase::Initial => Err(PlatformError::MalformedResponse {
                chain: chain.to_string(),
                step: "initial input",
                detail: err.to_string(),
            }),
            err => {
                warn!(chain, %err, msg = %hex_dump(msg), "malformed input record");
                Ok(DispatchOutcome {
                    lost_sync: true,
                    ..DispatchOutcome::default()
                })
            }
        }
    }

    fn input_response(&mut self, chain: &str, msg: &[u8], phase: Phase) -> PlatformResult<DispatchOutcome> {
        let record = match InputRecord::parse(msg) {
            Ok(record) => record,
            Err(err) => return self.record_error(chain, msg, phase, err),
        };
        let Some(card) = self.input_card_mut(chain, record.addr) else {
            warn!(chain, addr = record.addr, "input record from unknown card");
            return Ok(DispatchOutcome::default());
        };
        let mut outcome = DispatchOutcome {
            records: 1,
            ..DispatchOutcome::default()
        };
        match phase {
            Phase::Initial => card.old_state = record.state,
            Phase::Running => {
                let card_num = card.card();
                outcome.transitions = card
                    .apply(record.state)
                    .into_iter()
                    .map(|t| SwitchTransition {
                        key: ChannelKey::new(chain, card_num, t.channel),
                        active: t.active,
                    })
                    .collect();
            }
        }
        Ok(outcome)
    }

    fn matrix_response(&mut self, chain: &str, msg: &[u8], phase: Phase) -> PlatformResult<DispatchOutcome> {
        let record = match MatrixRecord::parse(msg) {
            Ok(record) => record,
            Err(err) => return self.record_error(chain, msg, phase, err),
        };
        let Some(card) = self.matrix_card_mut(chain, record.addr) else {
            warn!(chain, addr = record.addr, "matrix record from unknown card");
            return Ok(DispatchOutcome::default());
        };
        let mut outcome = DispatchOutcome {
            records: 1,
            ..DispatchOutcome::default()
        };
        match phase {
            Phase::Initial => card.old_state = record.banks,
            Phase::Running => {
                let card_num = card.card();
                outcome.transitions = card
                    .apply(record.banks)
                    .into_iter()
                    .map(|t| SwitchTransition {
                        key: ChannelKey::new(chain, card_num, t.channel),
                        active: t.active,
                    })
                    .collect();
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opp_gen2_protocol::{ConfigRecord, WingType, crc8_whole_msg};

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut out = body.to_vec();
        out.push(crc8_whole_msg(body));
        out
    }

    fn registry() -> PlatformResult<Registry> {
        let mut registry = Registry::new();
        registry.begin_chain("c")?;
        registry.register_board(
            "c",
            &ConfigRecord {
                addr: 0x20,
                wings: [WingType::Input, WingType::MatrixOut, WingType::Empty, WingType::Empty],
            },
        )?;
        Ok(registry)
    }

    #[test]
    fn test_initial_seeds_without_transitions() -> PlatformResult<()> {
        let mut registry = registry()?;
        let msg = with_crc(&[0x20, 0x08, 0xFF, 0xFF, 0xFF, 0xFE]);
        let outcome = registry.dispatch("c", &msg, Phase::Initial)?;
        assert!(outcome.transitions.is_empty());
        assert_eq!(outcome.records, 1);
        let outcome = registry.dispatch("c", &msg, Phase::Running)?;
        assert!(outcome.transitions.is_empty());
        Ok(())
    }

    #[test]
    fn test_running_emits_transitions() -> PlatformResult<()> {
        let mut registry = registry()?;
        let msg = with_crc(&[0x20, 0x08, 0xFF, 0xFF, 0xFF, 0xFE]);
        let outcome = registry.dispatch("c", &msg, Phase::Running)?;
        assert_eq!(
            outcome.transitions,
            vec![SwitchTransition {
                key: ChannelKey::new("c", 0, 0),
                active: true
            }]
        );
        Ok(())
    }

    #[test]
    fn test_matrix_running_uses_offset_channels() -> PlatformResult<()> {
        let mut registry = registry()?;
        let msg = with_crc(&[0x20, 0x19, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
        let outcome = registry.dispatch("c", &msg, Phase::Running)?;
        assert_eq!(
            outcome.transitions.first().map(|t| t.key.channel),
            Some(64)
        );
        Ok(())
    }

    #[test]
    fn test_bad_crc_counted_state_unchanged() -> PlatformResult<()> {
        let mut registry = registry()?;
        let outcome = registry.dispatch("c", &[0x20, 0x08, 0, 0, 0, 0, 0x00], Phase::Running)?;
        assert!(outcome.transitions.is_empty());
        assert!(!outcome.lost_sync);
        assert_eq!(registry.bad_crc_count(), 1);
        assert_eq!(registry.hw_switch_states().get("c-0-0"), Some(&0));
        Ok(())
    }

    #[test]
    fn test_short_record_phase_handling() -> PlatformResult<()> {
        let mut registry = registry()?;
        let outcome = registry.dispatch("c", &[0x20, 0x08, 0xFF], Phase::Running)?;
        assert!(outcome.lost_sync);
        assert!(matches!(
            registry.dispatch("c", &[0x20, 0x08, 0xFF], Phase::Initial),
            Err(PlatformError::MalformedResponse { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_command_requests_resync() -> PlatformResult<()> {
        let mut registry = registry()?;
        let outcome = registry.dispatch("c", &[0x20, 0x55, 0, 0], Phase::Running)?;
        assert!(outcome.lost_sync);
        let outcome = registry.dispatch("c", &[0x13], Phase::Running)?;
        assert!(outcome.lost_sync);
        let outcome = registry.dispatch("c", &[0xFF], Phase::Running)?;
        assert!(!outcome.lost_sync);
        Ok(())
    }
}
