//! Page obfuscation with an RC4-derived pad.
//!
//! A passphrase is run through the RC4 key schedule and the generator is
//! drawn for exactly one page worth of bytes. That pad is XORed over every
//! stored payload, so encryption and decryption are the same operation.
//!
//! ## Security Model
//!
//! The same pad is reused for every page encrypted under one key: identical
//! plaintext at the same in-page offset produces identical ciphertext in
//! every page. This is obfuscation of data at rest, not confidentiality
//! against an attacker who can read the data file. Changing the scheme
//! changes the on-disk format.

use crate::error::{CoreError, CoreResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// XOR stream cipher with a fixed, page-length pad.
///
/// The pad is wiped from memory when the cipher is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StreamCipher {
    pad: Vec<u8>,
}

impl StreamCipher {
    /// Creates a cipher producing a `pad_len`-byte pad from `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the passphrase is empty.
    pub fn new(passphrase: &[u8], pad_len: usize) -> CoreResult<Self> {
        let mut cipher = Self {
            pad: vec![0u8; pad_len],
        };
        cipher.set_key(passphrase)?;
        Ok(cipher)
    }

    /// Re-derives the pad from a new passphrase.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the passphrase is empty.
    pub fn set_key(&mut self, passphrase: &[u8]) -> CoreResult<()> {
        if passphrase.is_empty() {
            return Err(CoreError::invariant("cipher passphrase must not be empty"));
        }

        let mut state = [0u8; 256];
        for (i, slot) in state.iter_mut().enumerate() {
            *slot = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(passphrase[i % passphrase.len()]);
            state.swap(i, j as usize);
        }

        let (mut x, mut y) = (0u8, 0u8);
        for byte in &mut self.pad {
            x = x.wrapping_add(1);
            y = y.wrapping_add(state[x as usize]);
            state.swap(x as usize, y as usize);
            let k = state[x as usize].wrapping_add(state[y as usize]);
            *byte = state[k as usize];
        }

        state.zeroize();
        Ok(())
    }

    /// XORs `buf` with the pad in place.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `buf` is longer than the pad.
    pub fn crypt(&self, buf: &mut [u8]) -> CoreResult<()> {
        if buf.len() > self.pad.len() {
            return Err(CoreError::invariant(format!(
                "cannot encrypt {} bytes with a {}-byte pad",
                buf.len(),
                self.pad.len()
            )));
        }
        for (byte, key) in buf.iter_mut().zip(&self.pad) {
            *byte ^= key;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher")
            .field("pad", &"[REDACTED]")
            .field("pad_len", &self.pad.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_matches_rc4_keystream() {
        // RC4 keystream for key "Key".
        let cipher = StreamCipher::new(b"Key", 10).unwrap();
        let mut buf = [0u8; 10];
        cipher.crypt(&mut buf).unwrap();
        assert_eq!(
            buf,
            [0xEB, 0x9F, 0x77, 0x81, 0xB7, 0x34, 0xCA, 0x72, 0xA7, 0x19]
        );
    }

    #[test]
    fn crypt_is_an_involution() {
        let cipher = StreamCipher::new(b"passphrase", 4096).unwrap();
        let original: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();

        let mut buf = original.clone();
        cipher.crypt(&mut buf).unwrap();
        assert_ne!(buf, original);

        cipher.crypt(&mut buf).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn same_pad_for_every_buffer() {
        let cipher = StreamCipher::new(b"k", 64).unwrap();
        let mut a = [0x41u8; 64];
        let mut b = [0x41u8; 64];
        cipher.crypt(&mut a).unwrap();
        cipher.crypt(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_give_different_pads() {
        let a = StreamCipher::new(b"alpha", 32).unwrap();
        let b = StreamCipher::new(b"bravo", 32).unwrap();
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.crypt(&mut x).unwrap();
        b.crypt(&mut y).unwrap();
        assert_ne!(x, y);
    }

    #[test]
    fn set_key_replaces_pad() {
        let mut cipher = StreamCipher::new(b"alpha", 16).unwrap();
        cipher.set_key(b"Key").unwrap();
        let mut buf = [0u8; 2];
        cipher.crypt(&mut buf).unwrap();
        assert_eq!(buf, [0xEB, 0x9F]);
    }

    #[test]
    fn rejects_empty_key_and_oversized_buffer() {
        assert!(StreamCipher::new(b"", 16).is_err());

        let cipher = StreamCipher::new(b"k", 16).unwrap();
        let mut buf = [0u8; 17];
        assert!(cipher.crypt(&mut buf).unwrap_err().is_fatal());
    }

    #[test]
    fn debug_redacts_pad() {
        let cipher = StreamCipher::new(b"k", 16).unwrap();
        assert!(format!("{cipher:?}").contains("REDACTED"));
    }
}
