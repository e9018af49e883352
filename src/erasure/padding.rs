//! Zero padding of payloads to whole stripes
//!
//! A stripe is `data_shards * block_size` bytes. Padding is plain zero
//! fill with no length marker, so genuine trailing zero bytes of a payload
//! are indistinguishable from padding and are removed on reconstruction.

/// Pad `payload` with zeros to a non-zero multiple of `stripe_len`
///
/// An empty payload becomes one all-zero stripe so every shard has content.
pub fn pad_to_stripe(payload: &[u8], stripe_len: usize) -> Vec<u8> {
    let stripes = payload.len().div_ceil(stripe_len).max(1);
    let mut padded = Vec::with_capacity(stripes * stripe_len);
    padded.extend_from_slice(payload);
    padded.resize(stripes * stripe_len, 0x00);
    padded
}

/// Remove trailing zero bytes
pub fn strip_padding(mut data: Vec<u8>) -> Vec<u8> {
    let keep = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data.truncate(keep);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_stripe() {
        assert_eq!(pad_to_stripe(b"HELLOWORLD", 4).len(), 12);
        assert_eq!(pad_to_stripe(b"HELLOWORLD", 5).len(), 10);
        assert_eq!(pad_to_stripe(&[], 8), vec![0u8; 8]);
    }

    #[test]
    fn test_strip_padding() {
        assert_eq!(strip_padding(b"AB\0\0".to_vec()), b"AB".to_vec());
        assert_eq!(strip_padding(b"A\0B\0".to_vec()), b"A\0B".to_vec());
        assert!(strip_padding(vec![0u8; 4]).is_empty());
    }
}
