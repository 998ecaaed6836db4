//! 接続 1 本分のセッション
//!
//! チャンネルと接続ディスクリプタを所有し、破棄時に両方を閉じる。

use sshuart_auth::UserAuth;

use crate::acceptor::ConnectionAcceptor;
use crate::bridge::{BridgeExit, SessionBridge};
use crate::channel::{Connection, SecureChannel};
use crate::error::SessionError;
use crate::sched::Scheduler;

/// 受け付けた接続 1 本分のセッション
///
/// ## ライフサイクル
/// 1. `Session::new()` で受け付けた接続とチャンネルを渡す
/// 2. `run()` でハンドシェイク → ブリッジループ
/// 3. `run()` から戻るとチャンネルと接続が閉じられる
pub struct Session<C: SecureChannel, D: Connection> {
    id: u32,
    channel: C,
    connection: D,
}

impl<C: SecureChannel, D: Connection> Session<C, D> {
    pub fn new(id: u32, channel: C, connection: D) -> Self {
        Session {
            id,
            channel,
            connection,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// ハンドシェイクを完了させ、終了条件までブリッジする
    ///
    /// # 引数
    /// - `auth`: ハンドシェイク中に認証情報を検証する
    /// - `acceptor`: ハンドシェイクの試行回数と待ち時間
    /// - `bridge`: このセッション用に生成したブリッジ
    /// - `sched`: 協調スケジューラ
    ///
    /// # 戻り値
    /// ブリッジループの終了理由と統計
    ///
    /// # エラー
    /// ハンドシェイクが完了しなかった場合。ブリッジは実行されない。
    pub fn run(
        mut self,
        auth: &dyn UserAuth,
        acceptor: &mut ConnectionAcceptor,
        bridge: &mut SessionBridge,
        sched: &mut dyn Scheduler,
    ) -> Result<BridgeExit, SessionError> {
        let attempts = match acceptor.run(&mut self.channel, auth, sched) {
            Ok(attempts) => attempts,
            Err(e) => {
                log::warn!("session #{}: {}", self.id, e);
                return Err(e);
            }
        };
        log::info!("session #{}: handshake complete ({} attempts)", self.id, attempts);

        let mut exit = bridge.run(&mut self.channel, &mut self.connection, sched);
        exit.stats.handshake_attempts = attempts;
        Ok(exit)
    }
}

impl<C: SecureChannel, D: Connection> Drop for Session<C, D> {
    fn drop(&mut self) {
        self.channel.request_close();
        self.connection.close();
        log::debug!("session #{}: closed", self.id);
    }
}
