//! UART ステージングバッファ実装

use alloc::vec::Vec;

use spinning_top::Spinlock;

use crate::DEFAULT_STAGING_CAPACITY;

/// 片方向のステージングバッファ
#[derive(Debug)]
struct Staging {
    /// 未取得のデータ
    data: Vec<u8>,
    /// 保持できる最大バイト数
    capacity: usize,
    /// 受け付けた総バイト数（統計用）
    total_accepted: u64,
    /// 容量超過で捨てた総バイト数（統計用）
    total_dropped: u64,
}

impl Staging {
    fn new(capacity: usize) -> Self {
        Staging {
            data: Vec::new(),
            capacity,
            total_accepted: 0,
            total_dropped: 0,
        }
    }

    /// 容量の範囲で追記し、受け付けたバイト数を返す
    fn append(&mut self, bytes: &[u8]) -> usize {
        let room = self.capacity.saturating_sub(self.data.len());
        let mut accepted = bytes.len().min(room);
        if self.data.try_reserve(accepted).is_err() {
            accepted = 0;
        }
        self.data.extend_from_slice(&bytes[..accepted]);

        self.total_accepted += accepted as u64;
        self.total_dropped += (bytes.len() - accepted) as u64;
        accepted
    }

    fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.data)
    }
}

/// UART ステージングバッファの組
///
/// ## 責任
/// - UART から受けたデータ（outbound）を SSH セッションが取り出すまで保持する
/// - SSH セッションから受けたデータ（inbound）を UART ドライバが取り出すまで保持する
///
/// ## 注意
/// バッファ自体は UART を一切操作しない。
/// 実際の送受信は UART ドライバ（外部）とセッションブリッジが担当する。
#[derive(Debug)]
pub struct DeviceBuffers {
    /// device → peer
    outbound: Spinlock<Staging>,
    /// peer → device
    inbound: Spinlock<Staging>,
}

impl DeviceBuffers {
    /// デフォルト容量でバッファを生成する
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STAGING_CAPACITY, DEFAULT_STAGING_CAPACITY)
    }

    /// 方向ごとの容量を指定して生成する
    ///
    /// # 引数
    /// - `inbound_capacity`: peer → device 方向の最大バイト数
    /// - `outbound_capacity`: device → peer 方向の最大バイト数
    pub fn with_capacity(inbound_capacity: usize, outbound_capacity: usize) -> Self {
        DeviceBuffers {
            outbound: Spinlock::new(Staging::new(outbound_capacity)),
            inbound: Spinlock::new(Staging::new(inbound_capacity)),
        }
    }

    // ===== ブリッジ側 =====

    /// 送信待ちデータのスナップショットを取得し、バッファをクリアする
    ///
    /// 取得とクリアは同じロック内で行うため、並行する `push_outbound` の
    /// データはこのスナップショットか次のスナップショットのどちらか一方にだけ入る。
    ///
    /// # 戻り値
    /// 送信待ちのバイト列（空の場合は `Vec::new()`）
    pub fn take_outbound(&self) -> Vec<u8> {
        self.outbound.lock().take()
    }

    /// 送信待ちデータのバイト数
    pub fn pending_outbound_len(&self) -> usize {
        self.outbound.lock().data.len()
    }

    /// peer から受信したデータを UART 向けに積む
    ///
    /// # 戻り値
    /// 受け付けたバイト数。容量を超えた分は捨てられ、統計に計上される。
    pub fn append_inbound(&self, bytes: &[u8]) -> usize {
        let accepted = self.inbound.lock().append(bytes);
        if accepted < bytes.len() {
            log::warn!(
                "inbound staging full: dropped {} of {} bytes",
                bytes.len() - accepted,
                bytes.len()
            );
        }
        accepted
    }

    // ===== UART ドライバ側 =====

    /// UART から受けたデータを peer 向けに積む
    ///
    /// # 戻り値
    /// 受け付けたバイト数
    pub fn push_outbound(&self, bytes: &[u8]) -> usize {
        self.outbound.lock().append(bytes)
    }

    /// UART に書き出すデータをすべて取り出す
    pub fn drain_inbound(&self) -> Vec<u8> {
        self.inbound.lock().take()
    }

    /// UART 待ちデータのバイト数
    pub fn pending_inbound_len(&self) -> usize {
        self.inbound.lock().data.len()
    }

    /// 累積統計を返す
    pub fn stats(&self) -> DeviceStats {
        let (outbound_total, outbound_dropped) = {
            let staging = self.outbound.lock();
            (staging.total_accepted, staging.total_dropped)
        };
        let (inbound_total, inbound_dropped) = {
            let staging = self.inbound.lock();
            (staging.total_accepted, staging.total_dropped)
        };
        DeviceStats {
            inbound_total,
            inbound_dropped,
            outbound_total,
            outbound_dropped,
        }
    }
}

impl Default for DeviceBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// ステージングバッファの累積統計
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// peer → device で受け付けた総バイト数
    pub inbound_total: u64,
    /// peer → device で容量超過により捨てた総バイト数
    pub inbound_dropped: u64,
    /// device → peer で受け付けた総バイト数
    pub outbound_total: u64,
    /// device → peer で容量超過により捨てた総バイト数
    pub outbound_dropped: u64,
}
