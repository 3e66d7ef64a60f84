//! Periodic input polling and lamp updates.
//!
//! Both loops run until aborted. Each send waits for the chain writer to
//! drain before the next one starts.

use opp_gen2_protocol::{build_incand_update, hex_dump};
use tracing::{debug, trace, warn};

use crate::channel::CardKey;
use crate::platform::OppPlatform;

/// Sends every chain's composite input read. Each chain's read is followed
/// by a full poll interval, so no single link is read faster than `poll_hz`.
pub(crate) async fn poll_inputs(platform: OppPlatform) {
    let interval = platform.config().poll_interval();
    loop {
        let reads: Vec<(String, Vec<u8>)> = {
            let registry = platform.inner.registry.lock();
            registry
                .ready_chain_ids()
                .into_iter()
                .filter_map(|id| {
                    let msg = registry.chain(&id)?.read_input_msg.clone();
                    (!msg.is_empty()).then_some((id, msg))
                })
                .collect()
        };
        if reads.is_empty() {
            tokio::time::sleep(interval).await;
            continue;
        }
        for (chain, msg) in reads {
            let result = match platform.writer(&chain) {
                Ok(writer) => writer.send_and_drain(msg).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(chain, %err, "input poll failed");
            }
            // faster polling saturates the link and overwhelms the boards
            tokio::time::sleep(interval).await;
        }
    }
}

/// Sends incandescent states that changed since the last update.
pub(crate) async fn update_lamps(platform: OppPlatform) {
    let interval = platform.config().lamp_interval();
    loop {
        let pending: Vec<(CardKey, u8, u32)> = {
            let registry = platform.inner.registry.lock();
            registry
                .incand_cards
                .iter()
                .filter_map(|card| {
                    let state = card.pending()?;
                    let key = CardKey {
                        chain: card.chain.clone(),
                        card: card.card(),
                    };
                    Some((key, card.addr, state))
                })
                .collect()
        };
        for (key, addr, state) in pending {
            let frame = build_incand_update(addr, state);
            trace!(chain = %key.chain, addr, frame = %hex_dump(&frame), "lamp update");
            let result = match platform.writer(&key.chain) {
                Ok(writer) => writer.send_and_drain(frame).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {
                    if let Some(card) = platform.inner.registry.lock().incand_card_mut(&key) {
                        card.old_state = state;
                    }
                    debug!(chain = %key.chain, addr, state = format_args!("{state:#010x}"), "lamps updated");
                }
                Err(err) => warn!(chain = %key.chain, addr, %err, "lamp update failed"),
            }
        }
        tokio::time::sleep(interval).await;
    }
}
