//! セッション統計
//!
//! 統計表示の制御バイトを受けたとき、ピアにそのまま送り返すレポートを生成する。

use alloc::string::String;
use core::fmt::Write;

use serde::Serialize;

use crate::channel::ChannelStats;

/// レポートの形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsFormat {
    /// 端末向けのテキスト（CRLF 区切り）
    #[default]
    Text,
    /// 1 行の JSON
    Json,
}

/// セッション 1 本分のカウンタ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub session_id: u32,
    /// ハンドシェイク完了までの試行回数
    pub handshake_attempts: u32,
    /// peer から受信したバイト数
    pub bytes_received: u64,
    /// peer にエコーしたバイト数
    pub bytes_echoed: u64,
    /// UART 受信バッファに積んだバイト数
    pub bytes_to_device: u64,
    /// UART 受信バッファが満杯で捨てたバイト数
    pub bytes_dropped: u64,
    /// UART から peer へ転送したバイト数
    pub bytes_from_device: u64,
    pub rekeys: u32,
    pub stats_dumps: u32,
    pub channel: ChannelStats,
}

impl SessionStats {
    pub fn new(session_id: u32) -> Self {
        SessionStats {
            session_id,
            ..Default::default()
        }
    }

    /// レポートを生成する
    ///
    /// # 戻り値
    /// レポート文字列。JSON 化に失敗した場合は `None`
    pub fn render(&self, format: StatsFormat) -> Option<String> {
        match format {
            StatsFormat::Text => Some(self.to_text()),
            StatsFormat::Json => serde_json::to_string(self).ok(),
        }
    }

    /// テキスト形式のレポート
    ///
    /// ```text
    /// Statistics for Thread #1:
    ///   txCount = 12
    ///   rxCount = 9
    ///   seq = 12
    ///   peerSeq = 9
    /// ```
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // String への書き込みは失敗しない
        let _ = write!(
            out,
            "Statistics for Thread #{}:\r\n  txCount = {}\r\n  rxCount = {}\r\n  seq = {}\r\n  peerSeq = {}\r\n",
            self.session_id,
            self.channel.tx_count,
            self.channel.rx_count,
            self.channel.seq,
            self.channel.peer_seq,
        );
        let _ = write!(
            out,
            "  bytesReceived = {}\r\n  bytesFromDevice = {}\r\n  rekeys = {}\r\n",
            self.bytes_received, self.bytes_from_device, self.rekeys,
        );
        out
    }
}
