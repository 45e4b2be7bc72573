//! Verification code generation.
//!
//! Codes are short numeric strings delivered by email. Every digit is drawn
//! independently from the OS RNG with rejection sampling, so leading zeros
//! are as likely as any other digit. Codes are compared as exact strings
//! everywhere; they are never parsed as numbers.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};

/// Default number of digits in a verification code.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Generate a numeric verification code of the given length.
pub fn generate(length: usize) -> Result<String> {
    let mut digits = String::with_capacity(length);
    let mut buf = [0u8; 1];
    while digits.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .context("failed to generate verification code")?;
        // Reject the top band of byte values so each digit is equally likely.
        if buf[0] < 250 {
            digits.push(char::from(b'0' + buf[0] % 10));
        }
    }
    Ok(digits)
}
