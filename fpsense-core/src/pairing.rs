//! Host/module pairing code
//!
//! A pairing code binds one host to one physical module: the host writes the
//! code to a notepad page and keeps its own copy. A module that later reports
//! a different code has been swapped or wiped.

use sha2::{Digest, Sha256};

use crate::constants::notepad;

/// Length of a pairing code in characters (16 hash bytes, hex encoded)
pub const CODE_LEN: usize = 32;

/// Notepad page that holds the pairing code
pub const NOTEPAD_PAGE: u8 = 0;

/// Derive a pairing code from caller supplied entropy
///
/// # Algorithm
///
/// 1. SHA-256 over every seed part in order
/// 2. Keep the first 16 bytes of the digest
/// 3. Lower-case hex encode (32 characters, one notepad page)
///
/// # Examples
///
/// ```
/// use fpsense_core::pairing;
///
/// let code = pairing::derive_code(&[b"random", b"uptime"]);
/// assert_eq!(code.len(), pairing::CODE_LEN);
/// ```
pub fn derive_code(seed: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in seed {
        hasher.update(part);
    }
    let digest = hasher.finalize();

    hex::encode(&digest[..CODE_LEN / 2])
}

/// Decode a pairing code read back from a notepad page
///
/// Zero padding is stripped; a blank page or non-UTF-8 content yields `None`.
pub fn code_from_page(page: &[u8]) -> Option<String> {
    let page = &page[..page.len().min(notepad::PAGE_SIZE)];
    let end = page.iter().position(|b| *b == 0).unwrap_or(page.len());
    let text = std::str::from_utf8(&page[..end]).ok()?;

    (!text.is_empty()).then(|| text.to_string())
}
