//! 起動時に読み込む認証情報テーブル
//!
//! ## パスワードテーブル
//! ```text
//! identity:secret\n
//! ```
//!
//! ## 公開鍵テーブル
//! ```text
//! algorithm-id base64-blob identity\n
//! ```
//! 公開鍵認証のシークレットは Base64 をデコードした鍵ブロブそのもの。
//!
//! どちらのテーブルも、全行の検証が終わってからストアに登録する。
//! 1 行でも不正なら何も登録しない。

use alloc::vec::Vec;

use base64::Engine as _;

use crate::error::{CredentialError, TableFault};
use crate::store::CredentialStore;
use crate::AuthType;

/// 検証済み・未登録の認証情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagedCredential {
    pub(crate) auth_type: AuthType,
    pub(crate) identity: Vec<u8>,
    pub(crate) secret: Vec<u8>,
}

/// パスワードテーブルを読み込んでストアに登録する
///
/// # 戻り値
/// 登録した件数。空のテーブルは 0 件として成功する。
///
/// # エラー
/// - `CredentialError::Malformed`: 書式不正（ストアは変更されない）
/// - `CredentialError::OutOfMemory`: 領域確保に失敗（ストアは変更されない）
pub fn load_password_table(store: &mut CredentialStore, table: &str) -> Result<usize, CredentialError> {
    if table.is_empty() {
        log::warn!("password table is empty");
        return Ok(0);
    }
    let staged = parse_password_table(table)?;
    let count = store.add_staged(&staged)?;
    log::info!("loaded {} password credential(s)", count);
    Ok(count)
}

/// 公開鍵テーブルを読み込んでストアに登録する
///
/// # エラー
/// `load_password_table` と同じ。Base64 の不正も `Malformed` になる。
pub fn load_public_key_table(store: &mut CredentialStore, table: &str) -> Result<usize, CredentialError> {
    if table.is_empty() {
        log::warn!("public key table is empty");
        return Ok(0);
    }
    let staged = parse_public_key_table(table)?;
    let count = store.add_staged(&staged)?;
    log::info!("loaded {} public key credential(s)", count);
    Ok(count)
}

fn parse_password_table(table: &str) -> Result<Vec<StagedCredential>, CredentialError> {
    let mut staged = Vec::new();
    for (index, body) in terminated_lines(table) {
        let line = index + 1;
        let body = body.map_err(|fault| CredentialError::Malformed { line, fault })?;
        if body.is_empty() {
            continue;
        }

        let (identity, secret) = body
            .split_once(':')
            .ok_or(CredentialError::Malformed { line, fault: TableFault::MissingDelimiter })?;
        if identity.is_empty() {
            return Err(CredentialError::Malformed { line, fault: TableFault::EmptyIdentity });
        }

        staged.push(StagedCredential {
            auth_type: AuthType::Password,
            identity: identity.as_bytes().to_vec(),
            secret: secret.as_bytes().to_vec(),
        });
    }
    Ok(staged)
}

fn parse_public_key_table(table: &str) -> Result<Vec<StagedCredential>, CredentialError> {
    let mut staged = Vec::new();
    for (index, body) in terminated_lines(table) {
        let line = index + 1;
        let malformed = |fault| CredentialError::Malformed { line, fault };
        let body = body.map_err(malformed)?;
        if body.is_empty() {
            continue;
        }

        let (algorithm, rest) = body
            .split_once(' ')
            .ok_or(malformed(TableFault::MissingDelimiter))?;
        let (blob_b64, identity) = rest
            .split_once(' ')
            .ok_or(malformed(TableFault::MissingDelimiter))?;
        if algorithm.is_empty() {
            return Err(malformed(TableFault::EmptyAlgorithm));
        }
        if identity.is_empty() {
            return Err(malformed(TableFault::EmptyIdentity));
        }

        let blob = base64::engine::general_purpose::STANDARD
            .decode(blob_b64)
            .map_err(|_| malformed(TableFault::InvalidBase64))?;

        log::debug!("public key line {}: algorithm={}, {} byte blob", line, algorithm, blob.len());
        staged.push(StagedCredential {
            auth_type: AuthType::PublicKey,
            identity: identity.as_bytes().to_vec(),
            secret: blob,
        });
    }
    Ok(staged)
}

/// 改行で終わる行を列挙する（行末の `\r` は取り除く）
///
/// 最終行が改行で終わっていない場合は `TableFault::MissingNewline` を返す。
fn terminated_lines(table: &str) -> impl Iterator<Item = (usize, Result<&str, TableFault>)> + '_ {
    table.split_inclusive('\n').enumerate().map(|(index, raw)| {
        let body = match raw.strip_suffix('\n') {
            Some(body) => Ok(body.strip_suffix('\r').unwrap_or(body)),
            None => Err(TableFault::MissingNewline),
        };
        (index, body)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verdict;

    const PASSWORDS: &str = "jill:upthehill\njack:fetchapail\n";

    // "ssh-ed25519" ブロブの先頭部分（テスト用の短いもの）
    const PUBLIC_KEYS: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 hansel\n\
                               ecdsa-sha2-nistp256 AAAAE2VjZHNh gretel\n";

    #[test]
    fn test_load_password_table() {
        let mut store = CredentialStore::new();
        let count = load_password_table(&mut store, PASSWORDS).unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.lookup(b"jill", AuthType::Password, b"upthehill"), Verdict::Success);
        assert_eq!(store.lookup(b"jack", AuthType::Password, b"fetchapail"), Verdict::Success);
    }

    #[test]
    fn test_password_may_contain_colon() {
        let mut store = CredentialStore::new();
        load_password_table(&mut store, "admin:a:b:c\n").unwrap();
        assert_eq!(store.lookup(b"admin", AuthType::Password, b"a:b:c"), Verdict::Success);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut store = CredentialStore::new();
        let count = load_password_table(&mut store, "jill:upthehill\r\n\njack:fetchapail\n").unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.lookup(b"jill", AuthType::Password, b"upthehill"), Verdict::Success);
    }

    #[test]
    fn test_empty_password_table_is_ok() {
        let mut store = CredentialStore::new();
        assert_eq!(load_password_table(&mut store, ""), Ok(0));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_delimiter_is_malformed() {
        let mut store = CredentialStore::new();
        let result = load_password_table(&mut store, "jill:upthehill\njack\n");
        assert_eq!(
            result,
            Err(CredentialError::Malformed { line: 2, fault: TableFault::MissingDelimiter })
        );
        // 1 行目も登録されていない
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_final_newline_is_malformed() {
        let mut store = CredentialStore::new();
        let result = load_password_table(&mut store, "jill:upthehill");
        assert_eq!(
            result,
            Err(CredentialError::Malformed { line: 1, fault: TableFault::MissingNewline })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_identity_is_malformed() {
        let mut store = CredentialStore::new();
        let result = load_password_table(&mut store, ":secret\n");
        assert_eq!(
            result,
            Err(CredentialError::Malformed { line: 1, fault: TableFault::EmptyIdentity })
        );
    }

    #[test]
    fn test_load_public_key_table() {
        let mut store = CredentialStore::new();
        let count = load_public_key_table(&mut store, PUBLIC_KEYS).unwrap();
        assert_eq!(count, 2);

        let blob = base64::engine::general_purpose::STANDARD
            .decode("AAAAC3NzaC1lZDI1NTE5")
            .unwrap();
        assert_eq!(store.lookup(b"hansel", AuthType::PublicKey, &blob), Verdict::Success);
        // Base64 文字列のままでは一致しない
        assert_eq!(
            store.lookup(b"hansel", AuthType::PublicKey, b"AAAAC3NzaC1lZDI1NTE5"),
            Verdict::InvalidSecret
        );
    }

    #[test]
    fn test_public_key_identity_keeps_rest_of_line() {
        let mut store = CredentialStore::new();
        load_public_key_table(&mut store, "ssh-rsa AAAA hansel@workstation\n").unwrap();
        let blob = [0u8, 0, 0];
        assert_eq!(
            store.lookup(b"hansel@workstation", AuthType::PublicKey, &blob),
            Verdict::Success
        );
    }

    #[test]
    fn test_public_key_invalid_base64() {
        let mut store = CredentialStore::new();
        let result = load_public_key_table(&mut store, "ssh-rsa !!!notbase64!!! hansel\n");
        assert_eq!(
            result,
            Err(CredentialError::Malformed { line: 1, fault: TableFault::InvalidBase64 })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_public_key_missing_identity_field() {
        let mut store = CredentialStore::new();
        let result = load_public_key_table(&mut store, "ssh-rsa AAAA\n");
        assert_eq!(
            result,
            Err(CredentialError::Malformed { line: 1, fault: TableFault::MissingDelimiter })
        );
    }

    #[test]
    fn test_tables_share_one_store() {
        let mut store = CredentialStore::new();
        load_password_table(&mut store, PASSWORDS).unwrap();
        load_public_key_table(&mut store, PUBLIC_KEYS).unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.lookup(b"hansel", AuthType::Password, b"x"), Verdict::InvalidAuthType);
    }
}
