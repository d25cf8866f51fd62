//! Shared-secret hashing for the handshake.
//!
//! Peers never send the secret itself, only this hash. It is not a
//! cryptographic construction: it keeps casual mismatches (wrong lobby,
//! typo) out, nothing more. Both sides must compute it identically, so
//! the algorithm is part of the wire contract:
//!
//! ```text
//! h = 17
//! for each UTF-16 code unit c of the secret:
//!     h = h * 31 + c        (wrapping 32-bit)
//! ```

/// Hashes a shared secret the way the handshake expects.
///
/// # Example
///
/// ```rust
/// use warroom_session::hash_secret;
///
/// assert_eq!(hash_secret(""), 17);
/// assert_eq!(hash_secret("a"), 17 * 31 + 97);
/// ```
pub fn hash_secret(secret: &str) -> i32 {
    secret
        .encode_utf16()
        .fold(17i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)))
}
