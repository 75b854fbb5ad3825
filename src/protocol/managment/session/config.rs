//! Session configuration: local address, bus timing and behaviour options.
use core::ops::BitOr;

use crate::error::ConfigError;
use crate::protocol::transport::{BusSpeed, MIN_SYNC_FREQUENCY_HZ};

//==================================================================================SESSION_OPTIONS
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
/// Set of session behaviour flags.
pub struct SessionOptions(u8);

impl SessionOptions {
    pub const NONE: Self = Self(0);
    /// Take part in the sync master election.
    pub const CAN_BE_SYNC_MASTER: Self = Self(0b001);
    /// Deliver frames this session transmits to its own inbound queue.
    pub const ECHO_OWN_FRAMES: Self = Self(0b010);
    /// Deliver sync and config-mode frames to the application as well.
    pub const DELIVER_CONTROL_FRAMES: Self = Self(0b100);

    /// `true` when every flag of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for SessionOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

//==================================================================================SESSION_CONFIG
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Validated parameters of a session.
pub struct SessionConfig {
    source_address: u8,
    speed: BusSpeed,
    sync_frequency_hz: u16,
    options: SessionOptions,
}

impl SessionConfig {
    /// Creates a `SessionConfigBuilder` for the given local address.
    pub fn builder(source_address: u8) -> SessionConfigBuilder {
        SessionConfigBuilder::new(source_address)
    }

    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    pub fn speed(&self) -> BusSpeed {
        self.speed
    }

    pub fn sync_frequency_hz(&self) -> u16 {
        self.sync_frequency_hz
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }
}

//==================================================================================SESSION_CONFIG_BUILDER
#[derive(Debug)]
/// Fluent builder for [`SessionConfig`].
pub struct SessionConfigBuilder {
    source_address: u8,
    speed: BusSpeed,
    sync_frequency_hz: Option<u16>,
    options: SessionOptions,
}

impl SessionConfigBuilder {
    /// 500 kbit/s, default sync rate for the speed, no options.
    pub fn new(source_address: u8) -> Self {
        Self {
            source_address,
            speed: BusSpeed::default(),
            sync_frequency_hz: None,
            options: SessionOptions::NONE,
        }
    }

    pub fn speed(mut self, speed: BusSpeed) -> Self {
        self.speed = speed;
        self
    }

    /// Overrides the speed's default sync rate.
    pub fn sync_frequency_hz(mut self, hz: u16) -> Self {
        self.sync_frequency_hz = Some(hz);
        self
    }

    /// Replaces the whole option set.
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn can_be_sync_master(mut self, enabled: bool) -> Self {
        self.options.set(SessionOptions::CAN_BE_SYNC_MASTER, enabled);
        self
    }

    pub fn echo_own_frames(mut self, enabled: bool) -> Self {
        self.options.set(SessionOptions::ECHO_OWN_FRAMES, enabled);
        self
    }

    pub fn deliver_control_frames(mut self, enabled: bool) -> Self {
        self.options.set(SessionOptions::DELIVER_CONTROL_FRAMES, enabled);
        self
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        if self.source_address == 0 {
            return Err(ConfigError::ReservedSourceAddress);
        }
        let hz = self
            .sync_frequency_hz
            .unwrap_or_else(|| self.speed.default_sync_frequency_hz());
        if hz == 0 {
            return Err(ConfigError::InvalidSyncFrequency { hz });
        }
        if hz < MIN_SYNC_FREQUENCY_HZ {
            return Err(ConfigError::SyncFrequencyTooLow {
                hz,
                min: MIN_SYNC_FREQUENCY_HZ,
            });
        }
        let max = self.speed.max_sync_frequency_hz();
        if hz > max {
            return Err(ConfigError::SyncFrequencyTooHigh { hz, max });
        }
        Ok(SessionConfig {
            source_address: self.source_address,
            speed: self.speed,
            sync_frequency_hz: hz,
            options: self.options,
        })
    }
}
