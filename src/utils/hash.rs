//! Content hashing using blake3.
//!
//! Used for cache-store file names (hash of the resource URL) and for
//! comparing image payloads without holding two copies around.

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a byte slice.
    #[inline]
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Self(*blake3::hash(data.as_ref()).as_bytes())
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 hex chars are plenty for log lines
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(ContentHash::of("abc"), ContentHash::of(b"abc"));
        assert_ne!(ContentHash::of("abc"), ContentHash::of("abd"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = ContentHash::of("https://example.com/font.ttf");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("abcd"), None);
        assert_eq!(ContentHash::from_hex("not hex"), None);
    }

    #[test]
    fn test_display_is_short() {
        assert_eq!(ContentHash::of("x").to_string().len(), 16);
    }
}
