//! Bounded append-only sink capturing the first bytes of a forwarding
//! direction for classification (component C3).

pub const HEADER_LEN: usize = 1024;

#[derive(Debug, Default, Clone)]
pub struct HeaderCache {
    buf: Vec<u8>,
}

impl HeaderCache {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(HEADER_LEN),
        }
    }

    /// Appends as many bytes of `data` as fit under `HEADER_LEN`, returning
    /// how many were actually copied. Once full, returns 0 for every
    /// subsequent call — never an error.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let remaining = HEADER_LEN.saturating_sub(self.buf.len());
        let n = data.len().min(remaining);
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= HEADER_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_past_capacity_are_silently_dropped() {
        let mut cache = HeaderCache::new();
        assert_eq!(cache.write(&vec![1u8; HEADER_LEN]), HEADER_LEN);
        assert!(cache.is_full());
        assert_eq!(cache.write(&[2, 3, 4]), 0);
        assert_eq!(cache.bytes().len(), HEADER_LEN);
    }

    #[test]
    fn partial_write_fills_remaining_space_only() {
        let mut cache = HeaderCache::new();
        assert_eq!(cache.write(&vec![1u8; HEADER_LEN - 2]), HEADER_LEN - 2);
        assert_eq!(cache.write(&[9, 9, 9, 9]), 2);
        assert!(cache.is_full());
    }
}
