//! サーバー本体
//!
//! 起動時に設定と認証情報テーブルから `ServerContext` を組み立て、
//! 受け付けた接続ごとにセッションを走らせる。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use sshuart_auth::{table, Authenticator, CredentialStore};
use sshuart_session::{
    BridgeExit, Connection, Scheduler, SecureChannel, Session, SessionBridge, SessionError,
};
use sshuart_stream::DeviceBuffers;

use crate::config::ServerConfig;
use crate::error::{ServeError, StartupError};

/// リスナーの非ブロッキング accept の結果
#[derive(Debug)]
pub enum Incoming<D> {
    Connection(D),
    /// 今は接続がない
    WouldBlock,
    /// リスナーが閉じられた
    Shutdown,
    Failed(i32),
}

/// TCP リスナー（bind / listen は組み込み先が済ませておく）
pub trait Listener {
    type Connection: Connection;

    fn accept(&mut self) -> Incoming<Self::Connection>;
}

/// 受け付けた接続の上にセキュアチャンネルを開く
pub trait ChannelFactory<D: Connection> {
    type Channel: SecureChannel;

    /// # 引数
    /// - `connection`: 受け付けた接続
    /// - `config`: バナーとハイウォーターマークを参照する
    fn open(
        &mut self,
        connection: &mut D,
        config: &ServerConfig,
    ) -> Result<Self::Channel, sshuart_session::ChannelFault>;
}

/// `serve` の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// 受け付けた接続数
    pub accepted: u32,
    /// ブリッジまで到達したセッション数
    pub bridged: u32,
    /// ハンドシェイクやチャンネルの失敗で終わった接続数
    pub failed: u32,
    /// 上限超過で閉じた接続数
    pub rejected: u32,
}

/// 全セッションで共有するサーバーの状態
///
/// `Sync` なので `Arc<ServerContext>` で複数のワーカーから `serve_connection` を呼べる。
pub struct ServerContext {
    config: ServerConfig,
    authenticator: Authenticator,
    device: Arc<DeviceBuffers>,
    next_session_id: AtomicU32,
    active_sessions: AtomicUsize,
}

impl ServerContext {
    /// 設定と認証情報テーブルからサーバーを組み立てる
    ///
    /// # 引数
    /// - `config`: サーバー設定
    /// - `password_table`: `identity:password` の行
    /// - `public_key_table`: `algorithm base64-blob identity` の行
    ///
    /// # エラー
    /// 設定が不正、またはテーブルのどこかに不正な行がある場合
    pub fn new(
        config: ServerConfig,
        password_table: &str,
        public_key_table: &str,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let mut store = CredentialStore::new();
        let passwords = table::load_password_table(&mut store, password_table)?;
        let keys = table::load_public_key_table(&mut store, public_key_table)?;
        log::info!("loaded {} password and {} public key credentials", passwords, keys);

        Self::with_store(config, store)
    }

    /// 読み込み済みのストアからサーバーを組み立てる
    pub fn with_store(config: ServerConfig, store: CredentialStore) -> Result<Self, StartupError> {
        config.validate()?;

        let device = Arc::new(DeviceBuffers::with_capacity(
            config.inbound_capacity,
            config.outbound_capacity,
        ));
        Ok(ServerContext {
            authenticator: Authenticator::new(Arc::new(store)),
            device,
            config,
            next_session_id: AtomicU32::new(0),
            active_sessions: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// UART ドライバと共有するバッファ
    pub fn device(&self) -> &Arc<DeviceBuffers> {
        &self.device
    }

    /// 処理中のセッション数
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// 受け付けた接続 1 本を処理する
    ///
    /// 上限に達していれば、ハンドシェイクせずに接続を閉じる。
    /// どの経路で戻っても接続とチャンネルは閉じられる。
    ///
    /// # エラー
    /// - `ServeError::Busy`: 同時セッション数の上限
    /// - `ServeError::Session(SessionError::OutOfMemory)`: backlog を確保できない
    /// - `ServeError::ChannelOpen` / `ServeError::Session`: チャンネルまたはハンドシェイクの失敗
    pub fn serve_connection<D, F>(
        &self,
        mut connection: D,
        factory: &mut F,
        sched: &mut dyn Scheduler,
    ) -> Result<BridgeExit, ServeError>
    where
        D: Connection,
        F: ChannelFactory<D>,
    {
        let Some(_slot) = SessionSlot::acquire(&self.active_sessions, self.config.max_sessions) else {
            log::warn!("session limit ({}) reached, closing connection", self.config.max_sessions);
            connection.close();
            return Err(ServeError::Busy);
        };

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let mut bridge =
            match SessionBridge::new(id, self.config.bridge_config(), Arc::clone(&self.device)) {
                Ok(bridge) => bridge,
                Err(e) => {
                    log::error!("session #{}: {}", id, e);
                    connection.close();
                    return Err(e.into());
                }
            };

        let channel = match factory.open(&mut connection, &self.config) {
            Ok(channel) => channel,
            Err(fault) => {
                log::error!("session #{}: could not open channel: {}", id, fault);
                connection.close();
                return Err(ServeError::ChannelOpen(fault));
            }
        };
        log::info!("session #{}: connection accepted", id);

        let session = Session::new(id, channel, connection);
        let exit = session.run(&self.authenticator, &mut self.config.acceptor(), &mut bridge, sched)?;
        Ok(exit)
    }

    /// リスナーから接続を受け付けて処理する
    ///
    /// `multiple_connections` が false なら最初の接続を処理した時点で戻る。
    /// 個々のセッションの失敗は集計するだけで、ループは続ける。
    /// メモリ不足だけはサーバー全体を止める。
    ///
    /// # エラー
    /// - `ServeError::Listen`: accept が失敗した
    /// - `ServeError::Session(SessionError::OutOfMemory)`: セッション領域を確保できない
    pub fn serve<L, F>(
        &self,
        listener: &mut L,
        factory: &mut F,
        sched: &mut dyn Scheduler,
    ) -> Result<ServeSummary, ServeError>
    where
        L: Listener,
        F: ChannelFactory<L::Connection>,
    {
        let mut summary = ServeSummary::default();

        loop {
            let connection = match listener.accept() {
                Incoming::Connection(connection) => connection,
                Incoming::WouldBlock => {
                    sched.feed_watchdog();
                    sched.yield_now();
                    continue;
                }
                Incoming::Shutdown => break,
                Incoming::Failed(code) => {
                    log::error!("accept failed (code {})", code);
                    return Err(ServeError::Listen(code));
                }
            };
            summary.accepted += 1;

            match self.serve_connection(connection, factory, sched) {
                Ok(exit) => {
                    summary.bridged += 1;
                    log::info!(
                        "session #{} finished: {} ({} bytes in, {} bytes out)",
                        exit.stats.session_id,
                        exit.reason,
                        exit.stats.bytes_received,
                        exit.stats.bytes_from_device
                    );
                }
                Err(ServeError::Busy) => summary.rejected += 1,
                Err(e @ ServeError::Session(SessionError::OutOfMemory)) => {
                    log::error!("stopping server after {} connections: {}", summary.accepted, e);
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    log::warn!("connection dropped: {}", e);
                }
            }

            if !self.config.multiple_connections {
                break;
            }
        }

        log::info!("server stopped after {} connections", summary.accepted);
        Ok(summary)
    }
}

/// 処理中セッション数の枠（破棄時に返却する）
struct SessionSlot<'a> {
    active: &'a AtomicUsize,
}

impl<'a> SessionSlot<'a> {
    fn acquire(active: &'a AtomicUsize, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .ok()
            .map(|_| SessionSlot { active })
    }
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use core::sync::atomic::AtomicBool;
    use core::time::Duration;

    use sshuart_auth::UserAuth;
    use sshuart_session::{
        ChannelFault, ChannelStats, HandshakeStatus, ReadStatus, Readiness, SendStatus,
        SpinScheduler,
    };

    struct RefusingChannel;

    impl SecureChannel for RefusingChannel {
        fn handshake_step(&mut self, _auth: &dyn UserAuth) -> HandshakeStatus {
            HandshakeStatus::Failed(ChannelFault::Protocol)
        }
        fn read(&mut self, _buf: &mut [u8]) -> ReadStatus {
            ReadStatus::Closed
        }
        fn send(&mut self, _buf: &[u8]) -> SendStatus {
            SendStatus::Failed(ChannelFault::Protocol)
        }
        fn trigger_rekey(&mut self) -> Result<(), ChannelFault> {
            Err(ChannelFault::Protocol)
        }
        fn request_close(&mut self) {}
        fn poll_readable(&mut self, _wait: Duration) -> Readiness {
            Readiness::Failed(ChannelFault::Protocol)
        }
        fn stats(&self) -> ChannelStats {
            ChannelStats::default()
        }
    }

    struct TestConnection {
        closed: Arc<AtomicBool>,
    }

    impl Connection for TestConnection {
        fn pending_error(&mut self) -> Option<i32> {
            None
        }
        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        opened: u32,
    }

    impl ChannelFactory<TestConnection> for CountingFactory {
        type Channel = RefusingChannel;

        fn open(
            &mut self,
            _connection: &mut TestConnection,
            _config: &ServerConfig,
        ) -> Result<RefusingChannel, ChannelFault> {
            self.opened += 1;
            Ok(RefusingChannel)
        }
    }

    struct QueueListener {
        incoming: VecDeque<Incoming<TestConnection>>,
    }

    impl Listener for QueueListener {
        type Connection = TestConnection;

        fn accept(&mut self) -> Incoming<TestConnection> {
            self.incoming.pop_front().unwrap_or(Incoming::Shutdown)
        }
    }

    /// 検証を通さずに組み立てる（確保できない backlog を再現するため）
    fn unvalidated(config: ServerConfig) -> ServerContext {
        ServerContext {
            config,
            authenticator: Authenticator::new(Arc::new(CredentialStore::new())),
            device: Arc::new(DeviceBuffers::new()),
            next_session_id: AtomicU32::new(0),
            active_sessions: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_backlog_allocation_failure_stops_server() {
        let server = unvalidated(ServerConfig {
            backlog_capacity: usize::MAX,
            multiple_connections: true,
            ..ServerConfig::default()
        });
        let first_closed = Arc::new(AtomicBool::new(false));
        let mut listener = QueueListener {
            incoming: VecDeque::from([
                Incoming::Connection(TestConnection {
                    closed: Arc::clone(&first_closed),
                }),
                Incoming::Connection(TestConnection {
                    closed: Arc::new(AtomicBool::new(false)),
                }),
            ]),
        };
        let mut factory = CountingFactory::default();

        let result = server.serve(&mut listener, &mut factory, &mut SpinScheduler);

        assert_eq!(result, Err(ServeError::Session(SessionError::OutOfMemory)));
        // 2 本目は受け付けない
        assert_eq!(listener.incoming.len(), 1);
        assert!(first_closed.load(Ordering::SeqCst));
        assert_eq!(factory.opened, 0);
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn test_session_failure_keeps_serving() {
        let server = unvalidated(ServerConfig {
            multiple_connections: true,
            ..ServerConfig::default()
        });
        let mut listener = QueueListener {
            incoming: VecDeque::from([
                Incoming::Connection(TestConnection {
                    closed: Arc::new(AtomicBool::new(false)),
                }),
                Incoming::Connection(TestConnection {
                    closed: Arc::new(AtomicBool::new(false)),
                }),
            ]),
        };
        let mut factory = CountingFactory::default();

        let summary = server
            .serve(&mut listener, &mut factory, &mut SpinScheduler)
            .unwrap();
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(factory.opened, 2);
    }

    #[test]
    fn test_session_slot_limit() {
        let active = AtomicUsize::new(0);
        let first = SessionSlot::acquire(&active, 2).unwrap();
        let second = SessionSlot::acquire(&active, 2).unwrap();
        assert!(SessionSlot::acquire(&active, 2).is_none());
        assert_eq!(active.load(Ordering::SeqCst), 2);

        drop(first);
        assert_eq!(active.load(Ordering::SeqCst), 1);
        let third = SessionSlot::acquire(&active, 2);
        assert!(third.is_some());

        drop(second);
        drop(third);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_new_rejects_malformed_tables() {
        let result = ServerContext::new(ServerConfig::default(), "jill:upthehill\nno-delimiter\n", "");
        assert!(matches!(result, Err(StartupError::Credentials(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ServerConfig {
            max_sessions: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            ServerContext::new(config, "", ""),
            Err(StartupError::Config(_))
        ));
    }

    #[test]
    fn test_device_capacity_follows_config() {
        let config = ServerConfig {
            inbound_capacity: 3,
            ..ServerConfig::default()
        };
        let server = ServerContext::new(config, "jill:upthehill\n", "").unwrap();
        assert_eq!(server.device().append_inbound(b"abcdef"), 3);
        assert_eq!(server.authenticator().store().len(), 1);
        assert_eq!(server.active_sessions(), 0);
    }
}
