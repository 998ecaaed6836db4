//! SSH ⇄ UART ブリッジループ
//!
//! 確立済みのセキュアチャンネルと UART ステージングバッファの間でバイト列を中継する。
//!
//! ## backlog
//!
//! ```text
//! backlog: [ 未排出のバイト | 空き ]
//!           ^ 先頭から排出   ^ 読み出しはここに追記
//! ```
//!
//! 排出（エコー送信）しきれなかった残りは先頭に詰めて次の回に持ち越す。
//! backlog が満杯の間はチャンネルから読まない（背圧）。

use alloc::sync::Arc;
use alloc::vec::Vec;

use sshuart_stream::DeviceBuffers;

use crate::channel::{ChannelFault, Connection, ReadStatus, SecureChannel, SendStatus};
use crate::control::{ControlAction, ControlBytes};
use crate::error::SessionError;
use crate::sched::Scheduler;
use crate::stats::{SessionStats, StatsFormat};
use crate::{DEFAULT_BACKLOG_CAPACITY, DEFAULT_READ_CHUNK};

/// ブリッジの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// backlog の容量（バイト）
    pub backlog_capacity: usize,
    /// 1 回の read の上限（バイト）
    pub read_chunk: usize,
    /// 受信したバイト列を peer にエコーするか
    pub echo: bool,
    pub controls: ControlBytes,
    pub stats_format: StatsFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            read_chunk: DEFAULT_READ_CHUNK,
            echo: false,
            controls: ControlBytes::default(),
            stats_format: StatsFormat::Text,
        }
    }
}

/// ブリッジループが終了した理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// 切断の制御バイトを受信した
    Terminated,
    /// peer がチャンネルを正常に閉じた
    PeerClosed,
    /// 帯域外のソケットエラー
    SocketError(i32),
    /// 読み書きの回復不能なエラー
    ChannelFailed(ChannelFault),
    /// UART からのデータを送り切れなかった（送信 0 バイト）
    SendStalled,
    /// 鍵の再交換を開始できなかった
    RekeyFailed(ChannelFault),
    /// 統計レポートを送れなかった
    StatsFailed,
}

impl ExitReason {
    /// 正常な終了か（ユーザー操作・peer によるクローズ）
    pub fn is_orderly(&self) -> bool {
        matches!(self, ExitReason::Terminated | ExitReason::PeerClosed)
    }
}

impl core::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ExitReason::Terminated => write!(f, "Terminated by control byte"),
            ExitReason::PeerClosed => write!(f, "Peer closed the channel"),
            ExitReason::SocketError(code) => write!(f, "Socket error (code {})", code),
            ExitReason::ChannelFailed(fault) => write!(f, "Channel failed: {}", fault),
            ExitReason::SendStalled => write!(f, "Channel stopped accepting device data"),
            ExitReason::RekeyFailed(fault) => write!(f, "Rekey failed: {}", fault),
            ExitReason::StatsFailed => write!(f, "Statistics report could not be sent"),
        }
    }
}

/// ブリッジループの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeExit {
    pub reason: ExitReason,
    pub stats: SessionStats,
}

/// 1 回の `send_all` が失敗した理由
enum SendFailure {
    Stalled,
    Fault(ChannelFault),
}

/// `data` を分割送信も含めて送り切る
///
/// 鍵交換中は yield してから再試行する。間に他の送信は挟まらない。
fn send_all<C: SecureChannel + ?Sized>(
    channel: &mut C,
    data: &[u8],
    sched: &mut dyn Scheduler,
) -> Result<(), SendFailure> {
    let mut offset = 0;
    while offset < data.len() {
        match channel.send(&data[offset..]) {
            SendStatus::Sent(0) => return Err(SendFailure::Stalled),
            SendStatus::Sent(n) if n > data.len() - offset => {
                log::error!("channel reported {} bytes sent of {}", n, data.len() - offset);
                return Err(SendFailure::Fault(ChannelFault::Protocol));
            }
            SendStatus::Sent(n) => offset += n,
            SendStatus::Rekeying => sched.yield_now(),
            SendStatus::Failed(fault) => return Err(SendFailure::Fault(fault)),
        }
    }
    Ok(())
}

/// セッション 1 本分のブリッジ
pub struct SessionBridge {
    config: BridgeConfig,
    device: Arc<DeviceBuffers>,
    /// peer から受信して未排出のバイト列（容量は `config.backlog_capacity` で固定）
    backlog: Vec<u8>,
    stats: SessionStats,
}

impl SessionBridge {
    /// ブリッジを生成する
    ///
    /// # エラー
    /// - `SessionError::OutOfMemory`: backlog を確保できない
    pub fn new(
        session_id: u32,
        config: BridgeConfig,
        device: Arc<DeviceBuffers>,
    ) -> Result<Self, SessionError> {
        let mut backlog = Vec::new();
        backlog
            .try_reserve_exact(config.backlog_capacity)
            .map_err(|_| SessionError::OutOfMemory)?;

        Ok(SessionBridge {
            config,
            device,
            backlog,
            stats: SessionStats::new(session_id),
        })
    }

    /// 未排出のバイト列
    pub fn backlog(&self) -> &[u8] {
        &self.backlog
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// 終了条件を満たすまでループする
    pub fn run<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        conn: &mut dyn Connection,
        sched: &mut dyn Scheduler,
    ) -> BridgeExit {
        log::info!("session #{}: bridge started", self.stats.session_id);

        let reason = loop {
            if let Some(reason) = self.step(channel, conn, sched) {
                break reason;
            }
            sched.feed_watchdog();
            sched.yield_now();
        };

        self.stats.channel = channel.stats();
        if reason.is_orderly() {
            log::info!("session #{}: {}", self.stats.session_id, reason);
        } else {
            log::error!("session #{}: {}", self.stats.session_id, reason);
        }

        BridgeExit {
            reason,
            stats: self.stats.clone(),
        }
    }

    /// ループ 1 回分
    ///
    /// # 戻り値
    /// ループを終えるべきなら `Some(reason)`
    pub fn step<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        conn: &mut dyn Connection,
        sched: &mut dyn Scheduler,
    ) -> Option<ExitReason> {
        if let Some(code) = conn.pending_error() {
            return Some(ExitReason::SocketError(code));
        }

        let received = match self.receive(channel) {
            Ok(received) => received,
            Err(reason) => return Some(reason),
        };

        if self.device.pending_outbound_len() > 0 {
            let snapshot = self.device.take_outbound();
            if let Err(reason) = self.forward_device(channel, &snapshot, sched) {
                return Some(reason);
            }
        }

        if received > 0 {
            self.publish(received);
        }

        if self.backlog.is_empty() {
            None
        } else {
            self.drain(channel, sched)
        }
    }

    /// backlog の空きに非ブロッキングで読み出す
    fn receive<C: SecureChannel + ?Sized>(&mut self, channel: &mut C) -> Result<usize, ExitReason> {
        let free = self.config.backlog_capacity.saturating_sub(self.backlog.len());
        if free == 0 {
            log::trace!("session #{}: backlog full, skipping read", self.stats.session_id);
            return Ok(0);
        }

        let want = free.min(self.config.read_chunk);
        let start = self.backlog.len();
        // 容量は確保済みなので再確保は起きない
        self.backlog.resize(start + want, 0);

        let status = channel.read(&mut self.backlog[start..]);
        let received = match status {
            ReadStatus::Data(n) if n > want => {
                log::error!(
                    "session #{}: channel reported {} bytes for a {} byte buffer",
                    self.stats.session_id,
                    n,
                    want
                );
                self.backlog.truncate(start);
                return Err(ExitReason::ChannelFailed(ChannelFault::Protocol));
            }
            ReadStatus::Data(n) => n,
            _ => 0,
        };
        self.backlog.truncate(start + received);

        match status {
            ReadStatus::Data(_) | ReadStatus::WouldBlock => {
                if received > 0 {
                    log::debug!("session #{}: received {} bytes", self.stats.session_id, received);
                }
                self.stats.bytes_received += received as u64;
                Ok(received)
            }
            ReadStatus::Closed => Err(ExitReason::PeerClosed),
            ReadStatus::Failed(fault) => Err(ExitReason::ChannelFailed(fault)),
        }
    }

    /// UART からのスナップショットを加工せずに送る
    fn forward_device<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        snapshot: &[u8],
        sched: &mut dyn Scheduler,
    ) -> Result<(), ExitReason> {
        match send_all(channel, snapshot, sched) {
            Ok(()) => {
                log::debug!(
                    "session #{}: forwarded {} device bytes",
                    self.stats.session_id,
                    snapshot.len()
                );
                self.stats.bytes_from_device += snapshot.len() as u64;
                Ok(())
            }
            Err(SendFailure::Stalled) => Err(ExitReason::SendStalled),
            Err(SendFailure::Fault(fault)) => Err(ExitReason::ChannelFailed(fault)),
        }
    }

    /// 新着分を UART 受信バッファに積む
    fn publish(&mut self, received: usize) {
        let start = self.backlog.len() - received;
        let accepted = self.device.append_inbound(&self.backlog[start..]);
        self.stats.bytes_to_device += accepted as u64;
        self.stats.bytes_dropped += (received - accepted) as u64;
    }

    /// backlog を先頭から排出し、排出したチャンクごとに制御バイトを処理する
    fn drain<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        sched: &mut dyn Scheduler,
    ) -> Option<ExitReason> {
        let mut drained = 0;
        let mut exit = None;

        while drained < self.backlog.len() && exit.is_none() {
            let sent = if self.config.echo {
                match channel.send(&self.backlog[drained..]) {
                    // 送れなかった分は次の回に持ち越す
                    SendStatus::Sent(0) => break,
                    SendStatus::Sent(n) if n > self.backlog.len() - drained => {
                        log::error!(
                            "session #{}: channel reported {} bytes echoed of {}",
                            self.stats.session_id,
                            n,
                            self.backlog.len() - drained
                        );
                        exit = Some(ExitReason::ChannelFailed(ChannelFault::Protocol));
                        break;
                    }
                    SendStatus::Sent(n) => n,
                    SendStatus::Rekeying => {
                        sched.yield_now();
                        continue;
                    }
                    SendStatus::Failed(fault) => {
                        exit = Some(ExitReason::ChannelFailed(fault));
                        break;
                    }
                }
            } else {
                self.backlog.len() - drained
            };

            if self.config.echo {
                self.stats.bytes_echoed += sent as u64;
            }

            let control = self
                .config
                .controls
                .scan(&self.backlog[drained..drained + sent]);
            drained += sent;

            if let Some((offset, action)) = control {
                log::debug!(
                    "session #{}: control {:?} at offset {}",
                    self.stats.session_id,
                    action,
                    offset
                );
                exit = self.apply(action, channel, sched);
            }

            sched.feed_watchdog();
            sched.yield_now();
        }

        self.backlog.drain(..drained);
        exit
    }

    fn apply<C: SecureChannel + ?Sized>(
        &mut self,
        action: ControlAction,
        channel: &mut C,
        sched: &mut dyn Scheduler,
    ) -> Option<ExitReason> {
        match action {
            ControlAction::Terminate => Some(ExitReason::Terminated),
            ControlAction::Rekey => match channel.trigger_rekey() {
                Ok(()) => {
                    log::info!("session #{}: rekey requested", self.stats.session_id);
                    self.stats.rekeys += 1;
                    None
                }
                Err(fault) => Some(ExitReason::RekeyFailed(fault)),
            },
            ControlAction::DumpStats => self.dump_stats(channel, sched),
        }
    }

    fn dump_stats<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        sched: &mut dyn Scheduler,
    ) -> Option<ExitReason> {
        self.stats.stats_dumps += 1;
        self.stats.channel = channel.stats();

        let Some(report) = self.stats.render(self.config.stats_format) else {
            return Some(ExitReason::StatsFailed);
        };
        match send_all(channel, report.as_bytes(), sched) {
            Ok(()) => None,
            Err(_) => Some(ExitReason::StatsFailed),
        }
    }
}
