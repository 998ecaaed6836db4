//! sshuart-server エラー型

use sshuart_auth::CredentialError;
use sshuart_session::{ChannelFault, SessionError};

use crate::config::ConfigError;

/// 起動時のエラー（接続の受け付け前に返る）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    Config(ConfigError),
    /// 認証情報テーブルの読み込み失敗
    Credentials(CredentialError),
}

impl core::fmt::Display for StartupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "Invalid configuration: {}", e),
            StartupError::Credentials(e) => write!(f, "Credential table rejected: {}", e),
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<CredentialError> for StartupError {
    fn from(e: CredentialError) -> Self {
        StartupError::Credentials(e)
    }
}

/// 接続 1 本の処理、または受け付けループのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeError {
    /// 同時セッション数の上限に達している
    Busy,
    /// チャンネルを開けなかった
    ChannelOpen(ChannelFault),
    /// ハンドシェイクが完了しなかった
    Session(SessionError),
    /// リスナーの accept が失敗した
    Listen(i32),
}

impl core::fmt::Display for ServeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ServeError::Busy => write!(f, "Session limit reached"),
            ServeError::ChannelOpen(fault) => write!(f, "Could not open channel: {}", fault),
            ServeError::Session(e) => write!(f, "Session failed: {}", e),
            ServeError::Listen(code) => write!(f, "Accept failed (code {})", code),
        }
    }
}

impl From<SessionError> for ServeError {
    fn from(e: SessionError) -> Self {
        ServeError::Session(e)
    }
}
