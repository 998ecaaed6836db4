//! 認証器
//!
//! ハンドシェイク中、ピアが認証情報を提示するたびに同期的に呼び出される。
//! 状態は一切変更しない。

use alloc::string::String;
use alloc::sync::Arc;

use crate::store::CredentialStore;
use crate::{AuthMethod, Verdict};

/// ユーザー認証のインターフェース
///
/// セキュアチャンネルのハンドシェイク実装はこのトレイト経由で認証を問い合わせ、
/// 結果をチャンネル自身の拒否メカニズムでピアに伝える。
pub trait UserAuth {
    /// 提示された認証情報を検証する
    ///
    /// # 引数
    /// - `method`: ピアが選んだ認証方式
    /// - `identity`: ユーザー名
    /// - `secret`: パスワード、または公開鍵ブロブ
    fn verify(&self, method: AuthMethod, identity: &[u8], secret: &[u8]) -> Verdict;
}

/// `CredentialStore` を引く標準の認証器
#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<CredentialStore>,
}

impl Authenticator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Authenticator { store }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}

impl UserAuth for Authenticator {
    fn verify(&self, method: AuthMethod, identity: &[u8], secret: &[u8]) -> Verdict {
        // ストアが扱わない方式は照合せずに拒否する
        let Some(auth_type) = method.credential_type() else {
            log::warn!(
                "rejecting unsupported auth method {} for {:?}",
                method.name(),
                String::from_utf8_lossy(identity)
            );
            return Verdict::InvalidAuthType;
        };

        let verdict = self.store.lookup(identity, auth_type, secret);

        if verdict.is_success() {
            log::info!("{} auth accepted for {:?}", method.name(), String::from_utf8_lossy(identity));
        } else {
            log::warn!(
                "{} auth rejected for {:?}: {}",
                method.name(),
                String::from_utf8_lossy(identity),
                verdict
            );
        }
        verdict
    }
}
