//! Page payload compression.
//!
//! Pages are compressed with zlib. A payload is stored raw whenever the
//! compressed form is not strictly smaller than the page, so a stored size
//! equal to the page size always means "raw copy".

use crate::error::{CoreError, CoreResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::borrow::Cow;
use std::io::{Read, Write};

/// Compresses `page` at the given zlib level (0-9).
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn compress(page: &[u8], level: u32) -> CoreResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(page.len()), Compression::new(level));
    encoder.write_all(page)?;
    Ok(encoder.finish()?)
}

/// Returns the bytes to store for `page`: compressed when that is smaller, raw otherwise.
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn encode_page(page: &[u8], level: u32) -> CoreResult<Cow<'_, [u8]>> {
    let compressed = compress(page, level)?;
    if compressed.len() < page.len() {
        Ok(Cow::Owned(compressed))
    } else {
        Ok(Cow::Borrowed(page))
    }
}

/// Decompresses `payload` into `out`, which must be filled exactly.
///
/// # Errors
///
/// Returns an invariant violation if the stream is malformed or does not
/// produce exactly `out.len()` bytes.
pub fn decompress_into(payload: &[u8], out: &mut [u8]) -> CoreResult<()> {
    let expected = out.len();
    let mut produced = Vec::with_capacity(expected);

    ZlibDecoder::new(payload)
        .take(expected as u64 + 1)
        .read_to_end(&mut produced)
        .map_err(|e| CoreError::invariant(format!("corrupt compressed page: {e}")))?;

    if produced.len() != expected {
        return Err(CoreError::invariant(format!(
            "decompressed page has {} bytes, expected {expected}",
            produced.len()
        )));
    }

    out.copy_from_slice(&produced);
    Ok(())
}

/// Restores a stored payload into `out`.
///
/// A payload as long as `out` is a raw copy; anything shorter is compressed.
///
/// # Errors
///
/// Returns an invariant violation if the payload is longer than the page or
/// fails to decompress to exactly one page.
pub fn decode_page(payload: &[u8], out: &mut [u8]) -> CoreResult<()> {
    match payload.len().cmp(&out.len()) {
        std::cmp::Ordering::Equal => {
            out.copy_from_slice(payload);
            Ok(())
        }
        std::cmp::Ordering::Less => decompress_into(payload, out),
        std::cmp::Ordering::Greater => Err(CoreError::invariant(format!(
            "stored payload of {} bytes exceeds the {}-byte page",
            payload.len(),
            out.len()
        ))),
    }
}
