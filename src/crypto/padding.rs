//! PKCS#7 padding for the block cipher.
//!
//! `unpad` only inspects the final byte and is not constant time. It must not
//! sit behind anything that reports padding failures to an attacker.

use crate::error::{Error, Result};

/// Largest block size whose padding length fits in one byte
pub const MAX_BLOCK_SIZE: usize = 255;

/// Append `block_size - (len % block_size)` bytes, each equal to that count.
///
/// Always adds between 1 and `block_size` bytes. `block_size` must be in
/// `1..=255`, otherwise `InvalidInput`.
pub fn pad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;

    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    Ok(padded)
}

/// Strip PKCS#7 padding.
///
/// Fails with [`Error::InvalidPadding`] when the trailing length byte is zero
/// or larger than either the data or the block size.
pub fn unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;

    let pad_len = match data.last() {
        Some(&b) => b as usize,
        None => return Err(Error::InvalidPadding),
    };

    if pad_len == 0 || pad_len > data.len() || pad_len > block_size {
        return Err(Error::InvalidPadding);
    }

    Ok(data[..data.len() - pad_len].to_vec())
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(Error::InvalidInput(format!(
            "block size {} is outside 1..={}",
            block_size, MAX_BLOCK_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_partial_block() {
        let padded = pad(b"YELLOW SUBMARINE!", 16).unwrap();
        assert_eq!(padded.len(), 32);
        assert!(padded[17..].iter().all(|&b| b == 15));
    }

    #[test]
    fn test_pad_full_block_adds_block() {
        let padded = pad(&[7u8; 16], 16).unwrap();
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
    }

    #[test]
    fn test_pad_empty() {
        assert_eq!(pad(b"", 16).unwrap(), vec![16u8; 16]);
    }

    #[test]
    fn test_unpad_recovers_input() {
        for len in 0..40 {
            let data: Vec<u8> = (0..len as u8).collect();
            assert_eq!(unpad(&pad(&data, 16).unwrap(), 16).unwrap(), data);
        }
    }

    #[test]
    fn test_unpad_zero_length_byte() {
        let mut data = vec![1u8; 16];
        data[15] = 0;
        assert!(matches!(unpad(&data, 16), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_unpad_longer_than_block() {
        let data = vec![17u8; 32];
        assert!(matches!(unpad(&data, 16), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_unpad_longer_than_data() {
        assert!(matches!(unpad(&[1, 2, 9], 16), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_unpad_empty() {
        assert!(matches!(unpad(&[], 16), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_pad_rejects_zero_block() {
        assert!(matches!(pad(b"abc", 0), Err(Error::InvalidInput(_))));
        assert!(matches!(unpad(&[1], 0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_pad_rejects_oversized_block() {
        assert!(matches!(pad(&[0u8; 256], 256), Err(Error::InvalidInput(_))));
        assert!(matches!(unpad(&[1u8; 256], 256), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_pad_largest_block() {
        let padded = pad(&[9u8; 255], MAX_BLOCK_SIZE).unwrap();
        assert_eq!(padded.len(), 510);
        assert!(padded[255..].iter().all(|&b| b == 255));
        assert_eq!(unpad(&padded, MAX_BLOCK_SIZE).unwrap(), vec![9u8; 255]);
    }
}
