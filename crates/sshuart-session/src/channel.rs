//! セキュアチャンネルと接続の抽象
//!
//! SSH プロトコル本体（鍵交換・暗号化・チャンネル多重化）は外部実装が担当する。
//! このクレートは非ブロッキングの結果だけを見て状態を進める。

use core::time::Duration;

use serde::Serialize;
use sshuart_auth::{UserAuth, Verdict};

/// チャンネル側で発生した回復不能な障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFault {
    /// 下位の I/O エラー（実装依存のコード）
    Io(i32),
    /// プロトコル違反・復号失敗など
    Protocol,
    /// 認証が拒否され、ピアに拒否を通知済み
    AuthRejected(Verdict),
    /// 鍵交換を開始できない
    Rekey,
}

impl core::fmt::Display for ChannelFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ChannelFault::Io(code) => write!(f, "I/O error (code {})", code),
            ChannelFault::Protocol => write!(f, "Protocol error"),
            ChannelFault::AuthRejected(verdict) => write!(f, "Authentication rejected: {}", verdict),
            ChannelFault::Rekey => write!(f, "Key exchange could not be started"),
        }
    }
}

/// ハンドシェイク 1 ステップの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Complete,
    /// ソケットが読み込み可能になるのを待っている
    WantRead,
    /// ソケットが書き込み可能になるのを待っている
    WantWrite,
    Failed(ChannelFault),
}

/// 非ブロッキング読み出しの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// n バイト読み出した（0 は WouldBlock と同じ扱い）
    Data(usize),
    WouldBlock,
    /// ピアが正常にチャンネルを閉じた
    Closed,
    Failed(ChannelFault),
}

/// 送信の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// n バイト送信した（部分送信あり）
    Sent(usize),
    /// 鍵交換中のため今は送れない（再試行する）
    Rekeying,
    Failed(ChannelFault),
}

/// 読み込み可能待ちの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Timeout,
    Failed(ChannelFault),
}

/// チャンネルのカウンタ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// 送信パケット数
    pub tx_count: u32,
    /// 受信パケット数
    pub rx_count: u32,
    /// 自分側のシーケンス番号
    pub seq: u32,
    /// ピア側のシーケンス番号
    pub peer_seq: u32,
}

/// 認証済みセキュアチャンネル（SSH セッション 1 本）
///
/// すべての操作は非ブロッキング。待ちが必要なときはステータスで返す。
pub trait SecureChannel {
    /// ハンドシェイクを 1 ステップ進める
    ///
    /// ピアが認証情報を提示したら `auth` に問い合わせ、
    /// 拒否された場合はチャンネル自身の仕組みでピアに通知する。
    fn handshake_step(&mut self, auth: &dyn UserAuth) -> HandshakeStatus;

    /// 復号済みのデータを `buf` に読み出す
    fn read(&mut self, buf: &mut [u8]) -> ReadStatus;

    /// `buf` を暗号化して送信する
    fn send(&mut self, buf: &[u8]) -> SendStatus;

    /// 鍵の再交換を開始する
    fn trigger_rekey(&mut self) -> Result<(), ChannelFault>;

    /// チャンネルを閉じる（以降の操作は行わない）
    fn request_close(&mut self);

    /// 最大 `wait` の間、読み込み可能になるのを待つ
    fn poll_readable(&mut self, wait: Duration) -> Readiness;

    fn stats(&self) -> ChannelStats;
}

/// 受け付け済みの接続ディスクリプタ
pub trait Connection {
    /// 帯域外のソケットエラー（SO_ERROR 相当）
    ///
    /// # 戻り値
    /// エラーがあれば `Some(code)`。確認自体に失敗した場合も `Some` を返す。
    fn pending_error(&mut self) -> Option<i32>;

    fn close(&mut self);
}
