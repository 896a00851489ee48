//! Payload masking per RFC 6455 Section 5.3.
//!
//! Masking XORs every payload byte with `mask[i % 4]`; applying the same key
//! twice is the identity. The fast path works a `u32` word at a time and
//! finishes the tail byte-wise.

/// XOR `data` in place with the 4-byte mask key.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    // Word-at-a-time only pays off past a few chunks.
    if data.len() < 32 {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    } else {
        apply_mask_fast(data, mask);
    }
}

/// XOR `data` in place, processing 4 bytes per step via `u32` words.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_word = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ mask_word).to_ne_bytes());
    }
    // Chunk boundary is a multiple of 4, so the tail restarts at mask[0].
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_is_involutive() {
        let original: Vec<u8> = (0..=255).collect();
        let mask = [0xA1, 0xB2, 0xC3, 0xD4];

        let mut data = original.clone();
        apply_mask(&mut data, mask);
        assert_ne!(data, original);
        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_mask_empty() {
        let mut data: Vec<u8> = vec![];
        apply_mask(&mut data, [1, 2, 3, 4]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_mask_known_pattern() {
        let mut data = vec![0u8; 8];
        apply_mask(&mut data, [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(data, [0x11, 0x22, 0x33, 0x44, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_fast_path_matches_scalar() {
        let mask = [0x5E, 0x01, 0xFF, 0x80];
        for len in [0, 1, 2, 3, 4, 5, 7, 8, 31, 32, 33, 63, 100, 1021] {
            let original: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();

            let mut scalar = original.clone();
            for (i, byte) in scalar.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }

            let mut fast = original.clone();
            apply_mask_fast(&mut fast, mask);
            assert_eq!(fast, scalar, "len = {len}");

            let mut dispatched = original.clone();
            apply_mask(&mut dispatched, mask);
            assert_eq!(dispatched, scalar, "len = {len}");
        }
    }

    #[test]
    fn test_zero_mask_is_identity() {
        let original: Vec<u8> = (0..100).collect();
        let mut data = original.clone();
        apply_mask(&mut data, [0, 0, 0, 0]);
        assert_eq!(data, original);
    }
}
