//! MILCAN transport layer: CAN frame representations, 29-bit identifier
//! management, the priority transmit queue, and bus abstraction traits.
//!
//! ## MILCAN Timing Constants
//!
//! These constants define the bus rates, frame sizes and timeouts that
//! MWG-MILA-001 uses to derive the shared time base.
use embassy_time::Duration;

pub mod can_frame;
pub mod can_id;
pub mod traits;
pub mod tx_queue;

/// Worst-case length of a classic extended CAN frame on the wire, in bits.
///
/// 140 bits for a stuffed eight-byte extended data frame plus the 3-bit
/// interframe space.
pub const MAX_FRAME_BITS: u64 = 143;

/// Capacity of the inbound notification queue of a session.
pub const MAX_INBOUND_FRAMES: usize = 30;

/// Maximum gap between two bytes of a config-mode handshake sequence.
pub const CONFIG_INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(400);

/// Time a node stays in System Configuration without an Enter-Config refresh.
pub const CONFIG_MODE_TIMEOUT: Duration = Duration::from_secs(8);

/// Interval after which a pending local Enter-Config sequence restarts from `'C'`.
pub const CONFIG_ENTER_RESEND: Duration = Duration::from_secs(1);

/// Lowest sync frequency whose PTU still fits in [`CONFIG_INTER_BYTE_TIMEOUT`].
pub const MIN_SYNC_FREQUENCY_HZ: u16 = 3;

/// Number of PTUs without any sync frame before Operational falls back.
pub const SYNC_WATCHDOG_PTUS: u32 = 8;

//==================================================================================BUS_SPEED
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
/// Bit rates allowed by MWG-MILA-001 §2.4.1.
pub enum BusSpeed {
    /// 250 kbit/s.
    Kbps250,
    /// 500 kbit/s.
    #[default]
    Kbps500,
    /// 1 Mbit/s.
    Mbps1,
}

impl BusSpeed {
    /// Duration of one bit on the wire, in nanoseconds.
    pub const fn bit_period_ns(self) -> u64 {
        match self {
            BusSpeed::Kbps250 => 4_000,
            BusSpeed::Kbps500 => 2_000,
            BusSpeed::Mbps1 => 1_000,
        }
    }

    /// Sync rate recommended for this bit rate (MWG-MILA-001 §3.2.5.3).
    pub const fn default_sync_frequency_hz(self) -> u16 {
        match self {
            BusSpeed::Kbps250 => 512,
            BusSpeed::Kbps500 => 128,
            BusSpeed::Mbps1 => 64,
        }
    }

    /// Time needed to put one maximum-length frame on the bus, in nanoseconds.
    pub const fn max_frame_time_ns(self) -> u64 {
        MAX_FRAME_BITS * self.bit_period_ns()
    }

    /// Highest sync frequency at which one maximum-length frame still fits in a PTU.
    pub const fn max_sync_frequency_hz(self) -> u16 {
        let hz = 1_000_000_000 / self.max_frame_time_ns();
        if hz > u16::MAX as u64 {
            u16::MAX
        } else {
            hz as u16
        }
    }
}

/// Converts nanoseconds to the clock resolution, rounding up.
pub fn duration_from_nanos(nanos: u64) -> Duration {
    Duration::from_micros(nanos.div_ceil(1_000))
}
