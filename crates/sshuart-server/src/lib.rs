//! # sshuart-server
//!
//! SSH ⇄ UART ブリッジサーバーの組み立て。
//!
//! ## 使用方法
//!
//! ```text
//! let config = ServerConfig::parse(&config_text)?;
//! let server = ServerContext::new(config, PASSWORD_TABLE, PUBLIC_KEY_TABLE)?;
//!
//! // UART ドライバには server.device() を渡す
//! uart_task(Arc::clone(server.device()));
//!
//! // 接続の受け付け（multiple_connections = false なら 1 接続で戻る）
//! let summary = server.serve(&mut listener, &mut channel_factory, &mut scheduler)?;
//! ```
//!
//! ワーカーを接続ごとに立てるプラットフォームでは、
//! `Arc<ServerContext>` を共有して各ワーカーから `serve_connection` を呼ぶ。

#![no_std]
extern crate alloc;

pub mod config;
mod error;
pub mod server;

pub use config::{ConfigError, ServerConfig, DEFAULT_CONFIG};
pub use error::{ServeError, StartupError};
pub use server::{ChannelFactory, Incoming, Listener, ServeSummary, ServerContext};
