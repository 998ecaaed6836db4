//! ユニットテスト用の台本付きチャンネルと接続

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use sshuart_auth::UserAuth;
use sshuart_stream::DeviceBuffers;

use crate::channel::{
    ChannelFault, ChannelStats, Connection, HandshakeStatus, ReadStatus, Readiness, SecureChannel,
    SendStatus,
};

/// `read` 1 回分の台本
#[derive(Debug, Clone)]
pub enum ReadStep {
    Bytes(Vec<u8>),
    WouldBlock,
    /// UART 側にデータを積んでから WouldBlock を返す
    Device(Vec<u8>),
    Closed,
    Fail(ChannelFault),
    /// バッファに書かずに n バイト受信したと報告する
    Report(usize),
}

/// `send` 1 回分の台本
#[derive(Debug, Clone, Copy)]
pub enum SendStep {
    /// 最大 n バイト受け付ける
    Accept(usize),
    Rekeying,
    Fail(ChannelFault),
    /// 何も記録せずに n バイト送信したと報告する
    Report(usize),
}

pub struct ScriptedChannel {
    pub reads: VecDeque<ReadStep>,
    pub sends: VecDeque<SendStep>,
    pub device: Option<Arc<DeviceBuffers>>,
    pub rekey_result: Result<(), ChannelFault>,
    pub channel_stats: ChannelStats,
    /// 送信されたバイト列（連結）
    pub sent: Vec<u8>,
    /// `send` 1 回ごとの受理バイト列
    pub send_log: Vec<Vec<u8>>,
    /// `read` に渡されたバッファ長
    pub read_sizes: Vec<usize>,
    pub rekeys: u32,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedChannel {
    pub fn new(reads: Vec<ReadStep>) -> Self {
        ScriptedChannel {
            reads: reads.into_iter().collect(),
            sends: VecDeque::new(),
            device: None,
            rekey_result: Ok(()),
            channel_stats: ChannelStats {
                tx_count: 3,
                rx_count: 4,
                seq: 5,
                peer_seq: 6,
            },
            sent: Vec::new(),
            send_log: Vec::new(),
            read_sizes: Vec::new(),
            rekeys: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sends(mut self, sends: Vec<SendStep>) -> Self {
        self.sends = sends.into_iter().collect();
        self
    }

    pub fn with_device(mut self, device: Arc<DeviceBuffers>) -> Self {
        self.device = Some(device);
        self
    }
}

impl SecureChannel for ScriptedChannel {
    fn handshake_step(&mut self, _auth: &dyn UserAuth) -> HandshakeStatus {
        HandshakeStatus::Complete
    }

    fn read(&mut self, buf: &mut [u8]) -> ReadStatus {
        self.read_sizes.push(buf.len());
        match self.reads.pop_front() {
            Some(ReadStep::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    // 残りは次回の read で返す
                    self.reads.push_front(ReadStep::Bytes(bytes.split_off(n)));
                }
                ReadStatus::Data(n)
            }
            Some(ReadStep::WouldBlock) => ReadStatus::WouldBlock,
            Some(ReadStep::Device(bytes)) => {
                if let Some(device) = &self.device {
                    device.push_outbound(&bytes);
                }
                ReadStatus::WouldBlock
            }
            Some(ReadStep::Fail(fault)) => ReadStatus::Failed(fault),
            Some(ReadStep::Report(n)) => ReadStatus::Data(n),
            Some(ReadStep::Closed) | None => ReadStatus::Closed,
        }
    }

    fn send(&mut self, buf: &[u8]) -> SendStatus {
        let step = self.sends.pop_front().unwrap_or(SendStep::Accept(usize::MAX));
        match step {
            SendStep::Accept(limit) => {
                let n = limit.min(buf.len());
                self.sent.extend_from_slice(&buf[..n]);
                self.send_log.push(buf[..n].to_vec());
                SendStatus::Sent(n)
            }
            SendStep::Rekeying => SendStatus::Rekeying,
            SendStep::Fail(fault) => SendStatus::Failed(fault),
            SendStep::Report(n) => SendStatus::Sent(n),
        }
    }

    fn trigger_rekey(&mut self) -> Result<(), ChannelFault> {
        self.rekeys += 1;
        self.rekey_result
    }

    fn request_close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn poll_readable(&mut self, _wait: Duration) -> Readiness {
        Readiness::Ready
    }

    fn stats(&self) -> ChannelStats {
        self.channel_stats
    }
}

#[derive(Default)]
pub struct MockConnection {
    /// `pending_error` の台本（空になったら常にエラーなし）
    pub errors: VecDeque<Option<i32>>,
    pub closed: Arc<AtomicBool>,
}

impl Connection for MockConnection {
    fn pending_error(&mut self) -> Option<i32> {
        self.errors.pop_front().flatten()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
