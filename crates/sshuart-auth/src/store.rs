//! 認証情報ストア
//!
//! identity とシークレットダイジェストの組を登録順に保持する。
//! 起動時に読み込んだ後は変更せず、`Arc<CredentialStore>` で全セッションが共有する。

use alloc::string::String;
use alloc::vec::Vec;

use crate::digest::SecretDigest;
use crate::error::CredentialError;
use crate::table::StagedCredential;
use crate::{AuthType, Verdict, IDENTITY_MAX_LEN};

/// 固定長の identity（最大 31 バイト + 終端）
///
/// 31 バイトを超える identity は登録時に切り詰められる。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    bytes: [u8; IDENTITY_MAX_LEN + 1],
    len: u8,
}

impl Identity {
    /// identity を構築する（31 バイトを超える部分は切り捨て）
    pub fn new(raw: &[u8]) -> Self {
        let len = raw.len().min(IDENTITY_MAX_LEN);
        let mut bytes = [0u8; IDENTITY_MAX_LEN + 1];
        bytes[..len].copy_from_slice(&raw[..len]);
        // bytes[len] は終端のゼロのまま
        Identity { bytes, len: len as u8 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// 提示された identity と長さ込みで完全一致するか
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.as_bytes() == presented
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Identity({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// 登録済みの認証情報 1 件
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    auth_type: AuthType,
    identity: Identity,
    digest: SecretDigest,
}

impl CredentialRecord {
    fn new(auth_type: AuthType, identity: &[u8], secret: &[u8]) -> Result<Self, CredentialError> {
        let digest = SecretDigest::of(secret).ok_or(CredentialError::SecretTooLong)?;
        Ok(CredentialRecord {
            auth_type,
            identity: Identity::new(identity),
            digest,
        })
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn digest(&self) -> &SecretDigest {
        &self.digest
    }
}

/// 認証情報ストア
///
/// 内部の `Vec` は末尾が最新。検索は末尾から先頭へ走査するので、
/// 論理的には「先頭に追加して先頭から検索する」リストと同じ振る舞いになる。
#[derive(Debug, Default)]
pub struct CredentialStore {
    records: Vec<CredentialRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        CredentialStore {
            records: Vec::new(),
        }
    }

    /// 認証情報を登録する
    ///
    /// シークレットはダイジェストに変換して保持し、平文は保持しない。
    ///
    /// # エラー
    /// - `CredentialError::OutOfMemory`: レコード領域を確保できない
    /// - `CredentialError::SecretTooLong`: シークレットが `SECRET_MAX_LEN` を超える
    pub fn add(
        &mut self,
        auth_type: AuthType,
        identity: &[u8],
        secret: &[u8],
    ) -> Result<&CredentialRecord, CredentialError> {
        let record = CredentialRecord::new(auth_type, identity, secret)?;
        self.records
            .try_reserve(1)
            .map_err(|_| CredentialError::OutOfMemory)?;

        let index = self.records.len();
        self.push(record, identity);
        Ok(&self.records[index])
    }

    /// 検証済みのテーブル内容をまとめて登録する
    ///
    /// 全件のダイジェストと必要な領域を先に用意するので、
    /// 途中で失敗して一部だけ登録されることはない。
    pub(crate) fn add_staged(&mut self, staged: &[StagedCredential]) -> Result<usize, CredentialError> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(staged.len())
            .map_err(|_| CredentialError::OutOfMemory)?;
        for entry in staged {
            records.push(CredentialRecord::new(entry.auth_type, &entry.identity, &entry.secret)?);
        }
        self.records
            .try_reserve(records.len())
            .map_err(|_| CredentialError::OutOfMemory)?;

        for (record, entry) in records.into_iter().zip(staged) {
            self.push(record, &entry.identity);
        }
        Ok(staged.len())
    }

    /// 提示されたシークレットを照合する
    ///
    /// 最新のレコードから走査し、identity が最初に一致したレコードで判定する。
    ///
    /// ダイジェストを計算できない長さのシークレットはどのレコードとも一致しない。
    pub fn lookup(&self, identity: &[u8], auth_type: AuthType, secret: &[u8]) -> Verdict {
        match SecretDigest::of(secret) {
            Some(digest) => self.lookup_digest(identity, auth_type, &digest),
            None => self.lookup_with(identity, auth_type, |_| false),
        }
    }

    /// 計算済みダイジェストで照合する
    pub fn lookup_digest(
        &self,
        identity: &[u8],
        auth_type: AuthType,
        digest: &SecretDigest,
    ) -> Verdict {
        self.lookup_with(identity, auth_type, |stored| stored.matches(digest))
    }

    fn lookup_with(
        &self,
        identity: &[u8],
        auth_type: AuthType,
        secret_matches: impl Fn(&SecretDigest) -> bool,
    ) -> Verdict {
        match self.iter().find(|record| record.identity.matches(identity)) {
            None => Verdict::InvalidUser,
            Some(record) if record.auth_type != auth_type => Verdict::InvalidAuthType,
            Some(record) if secret_matches(&record.digest) => Verdict::Success,
            Some(_) => Verdict::InvalidSecret,
        }
    }

    /// 最新のレコードから順に走査する
    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> + '_ {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 領域は呼び出し側で確保済み
    fn push(&mut self, record: CredentialRecord, identity: &[u8]) {
        if identity.len() > IDENTITY_MAX_LEN {
            log::warn!(
                "identity {:?} truncated to {} bytes",
                String::from_utf8_lossy(identity),
                IDENTITY_MAX_LEN
            );
        }
        log::debug!("registered {:?} credential for {:?}", record.auth_type, record.identity);
        self.records.push(record);
    }
}
