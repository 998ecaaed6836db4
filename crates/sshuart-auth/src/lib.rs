//! # sshuart-auth
//!
//! SSH ユーザー認証のための認証情報ストアと認証器。
//! `no_std` + `alloc` 環境（ESP32 などの組み込みターゲットを含む）で動作する。
//!
//! ## シークレットのダイジェスト
//!
//! ```text
//! digest = SHA-256( len(secret): u32 BE ‖ secret )
//! ```
//!
//! 長さプレフィックスにより、長さの異なるシークレット同士が
//! 連結境界をずらしただけで同じハッシュ入力になることはない。
//! ストアはダイジェストのみを保持し、平文のシークレットは保持しない。
//!
//! ## 検索順序
//!
//! 後から登録したレコードが先に検索される（後勝ち）。
//! 同じ identity を再登録すると、以前のレコードは検索上は無効になる。

#![no_std]
extern crate alloc;

mod authenticator;
mod digest;
mod error;
mod store;
pub mod table;

pub use authenticator::{Authenticator, UserAuth};
pub use digest::{SecretDigest, DIGEST_LEN, SECRET_MAX_LEN};
pub use error::{CredentialError, TableFault};
pub use store::{CredentialRecord, CredentialStore, Identity};

/// identity の最大バイト数（固定長フィールド 32 バイトのうち 1 バイトは終端用）
pub const IDENTITY_MAX_LEN: usize = 31;

/// ストアに登録される認証情報の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// パスワード認証（シークレット = パスワード）
    Password,
    /// 公開鍵認証（シークレット = デコード済みの公開鍵ブロブ）
    PublicKey,
}

/// ピアが userauth リクエストで提示した認証方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Password,
    PublicKey,
    KeyboardInteractive,
    HostBased,
}

impl AuthMethod {
    /// SSH の method 名から認証方式を判定する
    ///
    /// 未知の名前は `None` を返す。
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"none" => Some(AuthMethod::None),
            b"password" => Some(AuthMethod::Password),
            b"publickey" => Some(AuthMethod::PublicKey),
            b"keyboard-interactive" => Some(AuthMethod::KeyboardInteractive),
            b"hostbased" => Some(AuthMethod::HostBased),
            _ => None,
        }
    }

    /// ストアで照合できる認証情報の種類
    ///
    /// ストアが扱わない方式（none / keyboard-interactive / hostbased）は `None`。
    pub fn credential_type(&self) -> Option<AuthType> {
        match self {
            AuthMethod::Password => Some(AuthType::Password),
            AuthMethod::PublicKey => Some(AuthType::PublicKey),
            AuthMethod::None | AuthMethod::KeyboardInteractive | AuthMethod::HostBased => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Password => "password",
            AuthMethod::PublicKey => "publickey",
            AuthMethod::KeyboardInteractive => "keyboard-interactive",
            AuthMethod::HostBased => "hostbased",
        }
    }
}

/// 認証の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// ダイジェストが一致した
    Success,
    /// identity が登録されていない
    InvalidUser,
    /// identity は登録済みだが、認証情報の種類が違う（または未対応の方式）
    InvalidAuthType,
    /// 種類は一致したがシークレットが違う
    InvalidSecret,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

impl core::fmt::Display for Verdict {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Verdict::Success => write!(f, "Authentication succeeded"),
            Verdict::InvalidUser => write!(f, "Unknown user"),
            Verdict::InvalidAuthType => write!(f, "Authentication type not accepted for user"),
            Verdict::InvalidSecret => write!(f, "Invalid password or public key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_name() {
        assert_eq!(AuthMethod::from_name(b"password"), Some(AuthMethod::Password));
        assert_eq!(AuthMethod::from_name(b"publickey"), Some(AuthMethod::PublicKey));
        assert_eq!(AuthMethod::from_name(b"gssapi-with-mic"), None);
    }

    #[test]
    fn test_method_name_roundtrip() {
        for method in [
            AuthMethod::None,
            AuthMethod::Password,
            AuthMethod::PublicKey,
            AuthMethod::KeyboardInteractive,
            AuthMethod::HostBased,
        ] {
            assert_eq!(AuthMethod::from_name(method.name().as_bytes()), Some(method));
        }
    }

    #[test]
    fn test_only_password_and_publickey_reach_the_store() {
        assert_eq!(AuthMethod::Password.credential_type(), Some(AuthType::Password));
        assert_eq!(AuthMethod::PublicKey.credential_type(), Some(AuthType::PublicKey));
        assert_eq!(AuthMethod::None.credential_type(), None);
        assert_eq!(AuthMethod::KeyboardInteractive.credential_type(), None);
        assert_eq!(AuthMethod::HostBased.credential_type(), None);
    }

    #[test]
    fn test_verdict_is_success() {
        assert!(Verdict::Success.is_success());
        assert!(!Verdict::InvalidSecret.is_success());
    }
}
