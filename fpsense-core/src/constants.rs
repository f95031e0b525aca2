//! Protocol constants

/// Default module handshake password
pub const DEFAULT_PASSWORD: u32 = 0x0000_0000;

/// Default UART baud rate (baud setting 6 × 9600)
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Default command timeout (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Maximum attempts for one command under the default retry policy
pub const MAX_RETRIES: usize = 3;

/// Library size assumed until the module reports its own
pub const DEFAULT_CAPACITY: u16 = 200;

/// Number of character buffers on the module
pub const CHAR_BUFFERS: u8 = 6;

/// Index table pages (32 bytes, 256 slots each)
pub const INDEX_TABLE_PAGES: u8 = 4;

/// Slots described by one index table page
pub const INDEX_TABLE_PAGE_SLOTS: u16 = 256;

/// Notepad geometry
pub mod notepad {
    /// Number of notepad pages
    pub const PAGES: u8 = 16;

    /// Bytes per notepad page
    pub const PAGE_SIZE: usize = 32;
}

/// Aura LED control codes
pub mod led {
    /// Breathing light
    pub const BREATHING: u8 = 0x01;

    /// Flashing light
    pub const FLASHING: u8 = 0x02;

    /// Light always on
    pub const ON: u8 = 0x03;

    /// Light always off
    pub const OFF: u8 = 0x04;

    /// Light gradually on
    pub const GRADUAL_ON: u8 = 0x05;

    /// Light gradually off
    pub const GRADUAL_OFF: u8 = 0x06;

    /// Red
    pub const RED: u8 = 0x01;

    /// Blue
    pub const BLUE: u8 = 0x02;

    /// Purple
    pub const PURPLE: u8 = 0x03;
}
