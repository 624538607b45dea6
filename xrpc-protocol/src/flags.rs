//! Optional protocol behaviors a client is configured with.

use crate::error::ProtocolError;

/// Capability bitfield, fixed when a client is constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    /// Validate method names and response content types.
    pub const STRICT: u8 = 1 << 0;
    /// Allow 8-byte integers (`<i8>`).
    pub const EIGHT_BYTE_INT: u8 = 1 << 1;
    /// Store cookies from responses and replay them on later requests.
    pub const COOKIES: u8 = 1 << 2;
    /// Allow `<nil/>` values.
    pub const NIL: u8 = 1 << 3;
    /// Accept any HTTP status code in the response.
    pub const IGNORE_STATUS_CODE: u8 = 1 << 4;

    const VALID_MASK: u8 = 0x1F;

    pub fn new() -> Self {
        Self(0)
    }

    /// All extensions enabled.
    pub fn all() -> Self {
        Self(Self::VALID_MASK)
    }

    pub fn with_strict(mut self) -> Self {
        self.0 |= Self::STRICT;
        self
    }

    pub fn with_i8(mut self) -> Self {
        self.0 |= Self::EIGHT_BYTE_INT;
        self
    }

    pub fn with_cookies(mut self) -> Self {
        self.0 |= Self::COOKIES;
        self
    }

    pub fn with_nil(mut self) -> Self {
        self.0 |= Self::NIL;
        self
    }

    pub fn with_ignore_status_code(mut self) -> Self {
        self.0 |= Self::IGNORE_STATUS_CODE;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.0 & Self::STRICT != 0
    }

    pub fn allows_i8(&self) -> bool {
        self.0 & Self::EIGHT_BYTE_INT != 0
    }

    pub fn cookies_enabled(&self) -> bool {
        self.0 & Self::COOKIES != 0
    }

    pub fn allows_nil(&self) -> bool {
        self.0 & Self::NIL != 0
    }

    pub fn ignores_status_code(&self) -> bool {
        self.0 & Self::IGNORE_STATUS_CODE != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_MASK != 0 {
            return Err(ProtocolError::unsupported(format!(
                "unknown capability bits {:#x}",
                bits & !Self::VALID_MASK
            )));
        }
        Ok(Self(bits))
    }
}
