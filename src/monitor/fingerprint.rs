//! 响应内容指纹
//!
//! 取 SHA-256 摘要的前 128 位，拆成两个小端 64 位整数保存。
//! 全零值表示"尚未观测过"。

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// 128 位响应内容指纹
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    pub high: u64,
    pub low: u64,
}

impl Fingerprint {
    /// 尚未观测过的指纹
    pub const ZERO: Fingerprint = Fingerprint { high: 0, low: 0 };

    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    /// 计算原始响应字节的指纹
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);

        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&digest[0..8]);
        low.copy_from_slice(&digest[8..16]);

        Self {
            high: u64::from_le_bytes(high),
            low: u64::from_le_bytes(low),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_fingerprint() {
        let a = Fingerprint::of(b"Service OK");
        let b = Fingerprint::of(b"Service OK");
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_different_bytes_differ() {
        assert_ne!(Fingerprint::of(b"v1"), Fingerprint::of(b"v2"));
    }

    #[test]
    fn test_empty_body_is_not_zero() {
        // 空响应体也有确定的摘要，不会与"未观测"混淆
        assert!(!Fingerprint::of(b"").is_zero());
        assert!(Fingerprint::ZERO.is_zero());
        assert_eq!(Fingerprint::default(), Fingerprint::ZERO);
    }

    #[test]
    fn test_display_is_32_hex_chars() {
        let text = Fingerprint::new(1, 2).to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text, "00000000000000010000000000000002");
    }
}
