//! Creation and extraction of the 29-bit CAN identifiers used by
//! MILCAN A (MWG-MILA-001).
use core::fmt;

use crate::error::CanIdBuildError;

// Define, build, and decompose a MILCAN CAN identifier.

/// Valid bits of an extended identifier.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;
/// Bits 26-28: priority, 0 is the highest.
pub const PRIORITY_MASK: u32 = 0x1C00_0000;
/// Bit 25: marks the frame as MILCAN rather than J1939.
pub const MILCAN_TYPE_BIT: u32 = 0x0200_0000;
/// Bit 24: request flag.
pub const REQUEST_BIT: u32 = 0x0100_0000;
/// Bits 16-23: primary type.
pub const PRIMARY_MASK: u32 = 0x00FF_0000;
/// Bits 8-15: secondary type.
pub const SECONDARY_MASK: u32 = 0x0000_FF00;
/// Bits 0-7: source address.
pub const SOURCE_MASK: u32 = 0x0000_00FF;

/// Lowest priority, used by default for application traffic.
pub const DEFAULT_PRIORITY: u8 = 7;

//==================================================================================PRIMARY_TYPES
/// Predefined primary types. Only [`SYSTEM_MANAGEMENT`](primary::SYSTEM_MANAGEMENT)
/// is interpreted by this crate; the rest pass through untouched.
pub mod primary {
    pub const SYSTEM_MANAGEMENT: u8 = 0x00;
    pub const PHYSICALLY_ADDRESSED: u8 = 0x31;
    pub const SYSTEM_CONFIG: u8 = 0x32;
    pub const SYSTEM_C_AND_C: u8 = 0x3C;
    pub const MOTION_CONTROL: u8 = 0x3E;
    pub const STA: u8 = 0x40;
    pub const FIRE_CONTROL: u8 = 0x42;
    pub const AUTOMOTIVE: u8 = 0x44;
    pub const NAVIGATION: u8 = 0x46;
    pub const POWER_MANAGEMENT: u8 = 0x50;
    pub const DAS: u8 = 0x52;
    pub const COMMUNICATIONS_BMS: u8 = 0x54;
    pub const HVAC_NBC: u8 = 0x56;
    pub const VISION_SENSOR_CONTROL: u8 = 0x58;
    pub const GENERIC_MMI: u8 = 0x5A;
    pub const FDSS: u8 = 0x5C;
    pub const LIGHTING: u8 = 0x5E;
    pub const BODY_ELECTRONICS: u8 = 0x60;
    pub const ALIVE_MESSAGE: u8 = 0x62;
    pub const DIAGNOSTICS_0: u8 = 0x63;
    pub const DIAGNOSTICS_1: u8 = 0x64;
    pub const DIAGNOSTICS_2: u8 = 0x65;
    pub const DIAGNOSTICS_3: u8 = 0x66;
}

/// Secondary types of the System Management family.
pub mod secondary {
    pub const SYNC: u8 = 0x80;
    pub const ENTER_CONFIG: u8 = 0x81;
    pub const EXIT_CONFIG: u8 = 0x82;
}

//==================================================================================CONTROL_KIND
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// System Management frames that drive the network state.
pub enum ControlKind {
    Sync,
    EnterConfig,
    ExitConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Named priority classes (hard, soft and non real-time).
pub enum PriorityClass {
    Hrt0,
    Hrt1,
    Hrt2,
    Hrt3,
    Srt1,
    Srt2,
    Srt3,
    Nrt,
}

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, MILCAN flags, primary/secondary types and source.
pub struct CanId(pub u32);

impl CanId {
    /// Creates a pre-configured `CanIdBuilder` for a message family and source address.
    pub fn builder(primary: u8, secondary: u8, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(primary, secondary, source_address)
    }

    /// Highest-priority System Management identifier, as used by sync and config frames.
    pub(crate) const fn system_management(secondary: u8, source_address: u8) -> Self {
        CanId(
            MILCAN_TYPE_BIT
                | ((primary::SYSTEM_MANAGEMENT as u32) << 16)
                | ((secondary as u32) << 8)
                | source_address as u32,
        )
    }

    /// The identifier restricted to its 29 valid bits.
    pub fn raw(&self) -> u32 {
        self.0 & EXTENDED_ID_MASK
    }

    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 & PRIORITY_MASK) >> 26) as u8
    }

    /// Named class of [`priority`](Self::priority).
    pub fn priority_class(&self) -> PriorityClass {
        match self.priority() {
            0 => PriorityClass::Hrt0,
            1 => PriorityClass::Hrt1,
            2 => PriorityClass::Hrt2,
            3 => PriorityClass::Hrt3,
            4 => PriorityClass::Srt1,
            5 => PriorityClass::Srt2,
            6 => PriorityClass::Srt3,
            _ => PriorityClass::Nrt,
        }
    }

    /// `true` when the MILCAN type marker is set; otherwise the frame is J1939.
    pub fn is_milcan(&self) -> bool {
        self.0 & MILCAN_TYPE_BIT != 0
    }

    pub fn is_request(&self) -> bool {
        self.0 & REQUEST_BIT != 0
    }

    /// Message family.
    pub fn primary(&self) -> u8 {
        ((self.0 & PRIMARY_MASK) >> 16) as u8
    }

    /// Message sub-type within the family.
    pub fn secondary(&self) -> u8 {
        ((self.0 & SECONDARY_MASK) >> 8) as u8
    }

    /// Eight-bit source address (logical node identifier on the MILCAN network).
    pub fn source_address(&self) -> u8 {
        (self.0 & SOURCE_MASK) as u8
    }

    /// Classifies System Management control frames; `None` for everything else.
    pub fn control_kind(&self) -> Option<ControlKind> {
        if !self.is_milcan() || self.primary() != primary::SYSTEM_MANAGEMENT {
            return None;
        }
        match self.secondary() {
            secondary::SYNC => Some(ControlKind::Sync),
            secondary::ENTER_CONFIG => Some(ControlKind::EnterConfig),
            secondary::EXIT_CONFIG => Some(ControlKind::ExitConfig),
            _ => None,
        }
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_milcan() {
            write!(
                f,
                "{:08X} (P {} {} PT {:02X} ST {:02X} SA {:02X})",
                self.raw(),
                self.priority(),
                if self.is_request() { "REQ" } else { "---" },
                self.primary(),
                self.secondary(),
                self.source_address()
            )
        } else {
            // J1939 layout: PF/PS in place of primary/secondary.
            write!(
                f,
                "{:08X} (P {} DP {} PF {:02X} PS {:02X} SA {:02X})",
                self.raw(),
                self.priority(),
                (self.0 >> 24) & 0x01,
                self.primary(),
                self.secondary(),
                self.source_address()
            )
        }
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder validating MILCAN field ranges.
pub struct CanIdBuilder {
    pub priority: u8,
    pub request: bool,
    pub primary: u8,
    pub secondary: u8,
    pub source_address: u8,
}

impl CanIdBuilder {
    /// Initializes the builder for a given family, sub-type and source address.
    pub fn new(primary: u8, secondary: u8, source_address: u8) -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            request: false,
            primary,
            secondary,
            source_address,
        }
    }

    /// Sets the priority (0-7) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the identifier as a request.
    pub fn request(mut self) -> Self {
        self.request = true;
        self
    }

    /// Builds the identifier with the MILCAN type marker set.
    ///
    /// Rejects priorities above 7 and the reserved source address 0.
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        if self.priority > 7 {
            return Err(CanIdBuildError::InvalidPriority {
                priority: self.priority,
            });
        }
        if self.source_address == 0 {
            return Err(CanIdBuildError::ReservedSourceAddress);
        }

        let mut id = MILCAN_TYPE_BIT
            | ((self.priority as u32) << 26)
            | ((self.primary as u32) << 16)
            | ((self.secondary as u32) << 8)
            | (self.source_address as u32);
        if self.request {
            id |= REQUEST_BIT;
        }
        Ok(CanId(id))
    }
}
