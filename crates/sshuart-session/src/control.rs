//! インバンド制御バイト
//!
//! ピアから届いたバイト列に含まれる特定の値でセッションを操作する。
//! デフォルトは Ctrl-C (0x03) で切断、Ctrl-F (0x06) で鍵の再交換、
//! Ctrl-E (0x05) で統計の表示。

/// 制御バイトに対応する動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Terminate,
    Rekey,
    DumpStats,
}

/// 制御バイトの割り当て
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBytes {
    pub terminate: u8,
    pub rekey: u8,
    pub stats: u8,
}

impl ControlBytes {
    pub const fn new(terminate: u8, rekey: u8, stats: u8) -> Self {
        ControlBytes {
            terminate,
            rekey,
            stats,
        }
    }

    /// 1 バイトに対応する動作
    pub fn action_for(&self, byte: u8) -> Option<ControlAction> {
        if byte == self.terminate {
            Some(ControlAction::Terminate)
        } else if byte == self.rekey {
            Some(ControlAction::Rekey)
        } else if byte == self.stats {
            Some(ControlAction::DumpStats)
        } else {
            None
        }
    }

    /// チャンク内で最もオフセットの小さい制御バイトを探す
    ///
    /// チャンクごとに実行される動作は高々 1 つ。後ろにある制御バイトは無視される。
    ///
    /// # 戻り値
    /// `Some((offset, action))`、制御バイトがなければ `None`
    pub fn scan(&self, chunk: &[u8]) -> Option<(usize, ControlAction)> {
        chunk
            .iter()
            .enumerate()
            .find_map(|(offset, &byte)| self.action_for(byte).map(|action| (offset, action)))
    }
}

impl Default for ControlBytes {
    fn default() -> Self {
        ControlBytes::new(0x03, 0x06, 0x05)
    }
}
