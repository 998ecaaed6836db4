//! シークレットダイジェスト
//!
//! ## ハッシュ入力
//! ```text
//! bytes[0..4] = len(secret) as u32, big-endian
//! bytes[4..]  = secret
//! ```
//!
//! ストアへの登録時と認証時で同じフレーミングを使うこと。
//! 長さが `u32` に収まらないシークレットはダイジェストを持たない。

use sha2::{Digest, Sha256};

/// ダイジェスト長（SHA-256）
pub const DIGEST_LEN: usize = 32;

/// 長さプレフィックスで表せるシークレットの最大長
pub const SECRET_MAX_LEN: usize = u32::MAX as usize;

/// 長さプレフィックス付き SHA-256 ダイジェスト（32バイト固定）
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretDigest([u8; DIGEST_LEN]);

impl SecretDigest {
    /// シークレットのダイジェストを計算する
    ///
    /// # 戻り値
    /// `secret` が `SECRET_MAX_LEN` を超える場合は `None`
    ///
    /// # 例
    /// ```
    /// use sshuart_auth::SecretDigest;
    /// let a = SecretDigest::of(b"upthehill").unwrap();
    /// assert!(a.matches(&SecretDigest::of(b"upthehill").unwrap()));
    /// assert!(!a.matches(&SecretDigest::of(b"fetchapail").unwrap()));
    /// ```
    pub fn of(secret: &[u8]) -> Option<Self> {
        let mut hasher = Sha256::new();
        update_framed(&mut hasher, secret)?;
        Some(SecretDigest(hasher.finalize().into()))
    }

    /// 32 バイトの生ダイジェストから復元する
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        SecretDigest(bytes)
    }

    /// 定数時間で比較する
    ///
    /// 先頭から何バイト一致したかで処理時間が変わらないようにする。
    pub fn matches(&self, other: &SecretDigest) -> bool {
        let diff = self
            .0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl core::fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // 先頭 4 バイトのみ表示
        write!(
            f,
            "SecretDigest({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// 長さプレフィックス + 本体をハッシュに流し込む
fn update_framed(hasher: &mut Sha256, part: &[u8]) -> Option<()> {
    hasher.update(length_prefix(part.len())?);
    hasher.update(part);
    Some(())
}

/// 4 バイト big-endian の長さ（切り詰めずに表せない長さは `None`）
fn length_prefix(len: usize) -> Option<[u8; 4]> {
    u32::try_from(len).ok().map(u32::to_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        for part in parts {
            update_framed(&mut hasher, part).unwrap();
        }
        hasher.finalize().into()
    }

    fn unframed(parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    #[test]
    fn test_digest_is_length_prefixed() {
        // SHA-256(00 00 00 03 'a' 'b' 'c') と一致すること
        let expected = unframed(&[&[0, 0, 0, 3], b"abc"]);
        assert_eq!(SecretDigest::of(b"abc").unwrap().as_bytes(), &expected);
    }

    #[test]
    fn test_concatenation_boundary_safe() {
        // フレーミングなしでは "ab"+"c" と "a"+"bc" は同じ入力になる
        assert_eq!(unframed(&[b"ab", b"c"]), unframed(&[b"a", b"bc"]));
        // 長さプレフィックス付きなら区別される
        assert_ne!(framed(&[b"ab", b"c"]), framed(&[b"a", b"bc"]));
    }

    #[test]
    fn test_empty_secret_has_digest() {
        let empty = SecretDigest::of(b"").unwrap();
        assert_eq!(empty.as_bytes().len(), DIGEST_LEN);
        assert!(!empty.matches(&SecretDigest::of(b"\0").unwrap()));
    }

    #[test]
    fn test_matches_is_exact() {
        let mut bytes = *SecretDigest::of(b"secret").unwrap().as_bytes();
        let original = SecretDigest::from_bytes(bytes);
        bytes[31] ^= 1;
        assert!(!original.matches(&SecretDigest::from_bytes(bytes)));
    }

    #[test]
    fn test_length_prefix_is_exact() {
        assert_eq!(length_prefix(3), Some([0, 0, 0, 3]));
        assert_eq!(length_prefix(SECRET_MAX_LEN), Some([0xFF; 4]));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_length_prefix_never_wraps() {
        // 2^32 バイトを 0 と同じプレフィックスにしない
        assert_eq!(length_prefix(SECRET_MAX_LEN + 1), None);
        assert_eq!(length_prefix(SECRET_MAX_LEN + 4), None);
    }
}
