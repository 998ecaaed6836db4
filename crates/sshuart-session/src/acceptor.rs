//! ハンドシェイクの受け付け
//!
//! 非ブロッキングのハンドシェイクを、固定回数の試行と
//! 上限付きの読み込み待ちで完了まで進める。

use core::time::Duration;

use sshuart_auth::UserAuth;

use crate::channel::{HandshakeStatus, Readiness, SecureChannel};
use crate::error::SessionError;
use crate::sched::Scheduler;
use crate::{DEFAULT_HANDSHAKE_ATTEMPTS, DEFAULT_HANDSHAKE_POLL_MS};

/// 受け付けの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptState {
    Idle,
    AwaitReadable,
    AwaitWritable,
    Complete,
    Failed,
}

/// ハンドシェイクを完了させる状態機械
///
/// `handshake_step` の呼び出し 1 回が試行 1 回分。
/// 読み込み待ちは `poll_wait` まで、書き込み待ちは待たずに次の試行へ進む。
#[derive(Debug, Clone)]
pub struct ConnectionAcceptor {
    max_attempts: u32,
    poll_wait: Duration,
    state: AcceptState,
    attempts: u32,
}

impl ConnectionAcceptor {
    pub fn new(max_attempts: u32, poll_wait: Duration) -> Self {
        ConnectionAcceptor {
            max_attempts,
            poll_wait,
            state: AcceptState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> AcceptState {
        self.state
    }

    /// これまでに消費した試行回数
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// ハンドシェイクを完了まで進める
    ///
    /// # 戻り値
    /// 完了までに要した試行回数
    ///
    /// # エラー
    /// - `SessionError::HandshakeExhausted`: 試行回数を使い切った
    /// - `SessionError::HandshakeFailed`: チャンネルが失敗を返した（認証拒否を含む）
    /// - `SessionError::PollFailed`: 読み込み待ちが失敗した
    pub fn run<C: SecureChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        auth: &dyn UserAuth,
        sched: &mut dyn Scheduler,
    ) -> Result<u32, SessionError> {
        self.state = AcceptState::Idle;
        self.attempts = 0;

        while self.attempts < self.max_attempts {
            self.attempts += 1;

            match channel.handshake_step(auth) {
                HandshakeStatus::Complete => {
                    self.state = AcceptState::Complete;
                    log::debug!("handshake complete after {} attempts", self.attempts);
                    return Ok(self.attempts);
                }
                HandshakeStatus::WantRead => {
                    self.state = AcceptState::AwaitReadable;
                    if let Readiness::Failed(fault) = channel.poll_readable(self.poll_wait) {
                        self.state = AcceptState::Failed;
                        log::error!("readiness poll failed during handshake: {}", fault);
                        return Err(SessionError::PollFailed(fault));
                    }
                }
                HandshakeStatus::WantWrite => {
                    self.state = AcceptState::AwaitWritable;
                }
                HandshakeStatus::Failed(fault) => {
                    self.state = AcceptState::Failed;
                    log::warn!("handshake failed: {}", fault);
                    return Err(SessionError::HandshakeFailed(fault));
                }
            }

            sched.feed_watchdog();
            sched.yield_now();
        }

        self.state = AcceptState::Failed;
        log::warn!("handshake not complete after {} attempts", self.attempts);
        Err(SessionError::HandshakeExhausted {
            attempts: self.attempts,
        })
    }
}

impl Default for ConnectionAcceptor {
    fn default() -> Self {
        Self::new(
            DEFAULT_HANDSHAKE_ATTEMPTS,
            Duration::from_millis(DEFAULT_HANDSHAKE_POLL_MS),
        )
    }
}
