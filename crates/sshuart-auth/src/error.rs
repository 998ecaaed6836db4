//! 認証情報エラー型

/// 認証情報の登録・テーブル読み込みのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// レコード領域を確保できない
    OutOfMemory,
    /// シークレットが長さプレフィックスで表せない（`SECRET_MAX_LEN` 超）
    SecretTooLong,
    /// 認証情報テーブルの書式が不正（`line` は 1 始まり）
    Malformed { line: usize, fault: TableFault },
}

/// テーブル 1 行の不正内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFault {
    /// 区切り文字（`:` または空白）が見つからない
    MissingDelimiter,
    /// 行が改行で終わっていない
    MissingNewline,
    /// identity が空
    EmptyIdentity,
    /// アルゴリズム名が空
    EmptyAlgorithm,
    /// 公開鍵ブロブの Base64 デコードに失敗
    InvalidBase64,
}

impl core::fmt::Display for TableFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TableFault::MissingDelimiter => write!(f, "missing field delimiter"),
            TableFault::MissingNewline => write!(f, "line is not newline-terminated"),
            TableFault::EmptyIdentity => write!(f, "empty identity"),
            TableFault::EmptyAlgorithm => write!(f, "empty key algorithm"),
            TableFault::InvalidBase64 => write!(f, "invalid Base64 key blob"),
        }
    }
}

impl core::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CredentialError::OutOfMemory => write!(f, "Out of memory while storing credentials"),
            CredentialError::SecretTooLong => write!(f, "Secret exceeds the length prefix range"),
            CredentialError::Malformed { line, fault } => {
                write!(f, "Malformed credential table at line {}: {}", line, fault)
            }
        }
    }
}
