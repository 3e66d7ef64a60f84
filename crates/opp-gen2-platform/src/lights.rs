//! Neopixel and incandescent outputs.

use opp_gen2_protocol::{build_neo_color_table, build_neo_set, hex_dump};
use tracing::{debug, warn};

use crate::cards::ColorSlot;
use crate::channel::ChannelKey;
use crate::config::{LedConfig, MatrixLightConfig};
use crate::error::{PlatformError, PlatformResult};
use crate::platform::OppPlatform;
use crate::ports::{LedPlatform, MatrixLightPlatform};

/// Most color channels one neopixel takes.
const MAX_LED_CHANNELS: u8 = 3;

/// One neopixel.
#[derive(Clone)]
pub struct LedHandle {
    pub key: ChannelKey,
    platform: OppPlatform,
}

impl std::fmt::Debug for LedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl LedHandle {
    /// Sets the pixel color, allocating a color table slot the first time a
    /// color is used on this board. Once the table is full new colors are
    /// dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is gone.
    pub fn color(&self, r: u8, g: u8, b: u8) -> PlatformResult<()> {
        let writer = self.platform.writer(&self.key.chain)?;
        let (addr, slot) = {
            let mut registry = self.platform.inner.registry.lock();
            let card = registry
                .neopixel_card_mut(&self.key.card_key())
                .ok_or_else(|| PlatformError::UnknownChannel {
                    kind: "led",
                    number: self.key.to_string(),
                })?;
            (card.addr, card.color_slot([r, g, b]))
        };

        let mut frames = Vec::new();
        let slot = match slot {
            ColorSlot::Existing(slot) => slot,
            ColorSlot::Allocated(slot) => {
                frames.extend(build_neo_color_table(addr, slot, [r, g, b]));
                slot
            }
            ColorSlot::Full => {
                warn!(led = %self.key, r, g, b, "neopixel color table full, color dropped");
                return Ok(());
            }
        };
        frames.extend(build_neo_set(addr, self.key.channel, slot));
        debug!(led = %self.key, slot, frame = %hex_dump(&frames), "neopixel");
        writer.send(frames)
    }
}

/// One incandescent lamp. Changes go out with the next lamp update.
#[derive(Clone)]
pub struct MatrixLightHandle {
    pub key: ChannelKey,
    platform: OppPlatform,
}

impl std::fmt::Debug for MatrixLightHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixLightHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl MatrixLightHandle {
    /// Any non-zero brightness turns the lamp fully on.
    pub fn on(&self, brightness: u8) {
        self.set(brightness > 0);
    }

    pub fn off(&self) {
        self.set(false);
    }

    fn set(&self, on: bool) {
        let mut registry = self.platform.inner.registry.lock();
        if let Some(card) = registry.incand_card_mut(&self.key.card_key()) {
            card.set(self.key.channel, on);
        }
    }
}

impl LedPlatform for OppPlatform {
    fn configure_led(&self, config: &LedConfig, channels: u8) -> PlatformResult<LedHandle> {
        if channels > MAX_LED_CHANNELS {
            return Err(PlatformError::InvalidConfiguration(format!(
                "led {} has {channels} channels, at most {MAX_LED_CHANNELS} are supported",
                config.number
            )));
        }
        let key = self.resolve("led", &config.number)?;
        self.inner
            .registry
            .lock()
            .neopixel_card_mut(&key.card_key())
            .ok_or_else(|| PlatformError::UnknownChannel {
                kind: "led",
                number: config.number.clone(),
            })?
            .add_pixel(key.channel);
        Ok(LedHandle {
            key,
            platform: self.clone(),
        })
    }
}

impl MatrixLightPlatform for OppPlatform {
    fn configure_matrixlight(&self, config: &MatrixLightConfig) -> PlatformResult<MatrixLightHandle> {
        let key = self.resolve("light", &config.number)?;
        if !self.inner.registry.lock().has_incand(&key) {
            return Err(PlatformError::UnknownChannel {
                kind: "light",
                number: config.number.clone(),
            });
        }
        self.ensure_lamp_task()?;
        Ok(MatrixLightHandle {
            key,
            platform: self.clone(),
        })
    }
}
