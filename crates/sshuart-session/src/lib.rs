//! # sshuart-session
//!
//! 受け付けた接続 1 本分の処理。ハンドシェイクを完了させ、
//! セキュアチャンネルと UART ステージングバッファの間でバイト列を中継する。
//!
//! ## セッションの状態遷移
//!
//! ```text
//! Idle → AwaitReadable / AwaitWritable (ハンドシェイク継続中)
//!      → Complete → ブリッジループ → 終了 (チャンネルと接続を解放)
//!      → Failed   (試行回数切れ・プロトコルエラー・認証拒否)
//! ```
//!
//! ## ブリッジループ 1 回分
//!
//! ```text
//! 0. ソケットエラー確認
//! 1. backlog に空きがあればチャンネルから非ブロッキング読み出し
//! 2. UART 送信待ちデータがあればスナップショットをそのまま peer へ送る
//! 3. 新着データを UART 受信バッファへ積み、backlog を排出（エコー）
//! 4. 排出したチャンクの制御バイトを処理（最小オフセットの 1 つだけ）
//! 5. 未送信分は backlog 先頭に残す
//! ```
//!
//! 暗号化・鍵交換・ソケットそのものは外部実装（`SecureChannel` / `Connection`）が担う。

#![no_std]
extern crate alloc;

pub mod acceptor;
pub mod bridge;
pub mod channel;
pub mod control;
mod error;
pub mod sched;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

pub use acceptor::{AcceptState, ConnectionAcceptor};
pub use bridge::{BridgeConfig, BridgeExit, ExitReason, SessionBridge};
pub use channel::{
    ChannelFault, ChannelStats, Connection, HandshakeStatus, ReadStatus, Readiness, SecureChannel,
    SendStatus,
};
pub use control::{ControlAction, ControlBytes};
pub use error::SessionError;
pub use sched::{Scheduler, SpinScheduler};
pub use session::Session;
pub use stats::{SessionStats, StatsFormat};

/// ハンドシェイクの最大試行回数
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 100;

/// ハンドシェイク中の読み込み待ち上限（ミリ秒）
pub const DEFAULT_HANDSHAKE_POLL_MS: u64 = 1000;

/// backlog の容量（バイト）
pub const DEFAULT_BACKLOG_CAPACITY: usize = 1024;

/// 設定で指定できる backlog 容量の上限（バイト）
pub const MAX_BACKLOG_CAPACITY: usize = 64 * 1024;

/// 1 回の読み出しの上限（バイト）
pub const DEFAULT_READ_CHUNK: usize = 256;
