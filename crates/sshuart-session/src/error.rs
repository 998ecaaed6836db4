//! sshuart-session エラー型

use crate::channel::ChannelFault;

/// セッション開始までのエラー
///
/// 確立後のセッション終了はエラーではなく `ExitReason` で表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 試行回数内にハンドシェイクが完了しなかった
    HandshakeExhausted { attempts: u32 },
    /// ハンドシェイクがチャンネル側の障害で失敗した（認証拒否を含む）
    HandshakeFailed(ChannelFault),
    /// 読み込み可能待ちに失敗した
    PollFailed(ChannelFault),
    /// backlog を確保できない
    OutOfMemory,
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::HandshakeExhausted { attempts } => {
                write!(f, "Handshake not complete after {} attempts", attempts)
            }
            SessionError::HandshakeFailed(fault) => write!(f, "Handshake failed: {}", fault),
            SessionError::PollFailed(fault) => write!(f, "Readiness poll failed: {}", fault),
            SessionError::OutOfMemory => write!(f, "Out of memory"),
        }
    }
}
