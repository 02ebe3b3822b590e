//! Session tokens and short human-typed verification codes.

use rand::{rngs::OsRng, RngCore};

use super::error::{Result, SessionError};

/// Random bytes behind a session token (256 bits).
pub const SESSION_TOKEN_BYTES: usize = 32;
/// Hex length of a session token.
pub const SESSION_TOKEN_LEN: usize = SESSION_TOKEN_BYTES * 2;
/// Digits in a verification code.
pub const VERIFICATION_CODE_DIGITS: usize = 6;

const CODE_SPACE: u32 = 1_000_000;
// Largest multiple of CODE_SPACE that fits in u32; draws above it are rejected.
const CODE_ZONE: u32 = u32::MAX - (u32::MAX % CODE_SPACE);

/// Create a new session token: 32 bytes from the OS RNG, hex encoded.
///
/// # Errors
/// Returns `SessionError::Generation` if the OS entropy source fails. Callers
/// must abort session creation in that case.
pub fn new_session_token() -> Result<String> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|source| SessionError::Generation {
            what: "session token",
            source,
        })?;
    Ok(hex::encode(bytes))
}

/// Create a 6-digit numeric code for email change or password reset flows.
///
/// The validity window belongs to the caller.
///
/// # Errors
/// Returns `SessionError::Generation` if the OS entropy source fails.
pub fn new_verification_code() -> Result<String> {
    loop {
        let mut bytes = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|source| SessionError::Generation {
                what: "verification code",
                source,
            })?;
        let value = u32::from_le_bytes(bytes);
        if value < CODE_ZONE {
            return Ok(format!(
                "{:0width$}",
                value % CODE_SPACE,
                width = VERIFICATION_CODE_DIGITS
            ));
        }
    }
}

/// True when `token` has the exact shape produced by [`new_session_token`].
///
/// Tokens become file paths, so anything else is rejected before touching disk.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    token.len() == SESSION_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}
