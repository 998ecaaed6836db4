//! # sshuart-stream
//!
//! SSH ブリッジと UART ドライバの間で共有するステージングバッファ。
//!
//! ## データの流れ
//!
//! ```text
//! 送信 (device → peer):
//!   1. UART 受信割り込み/タスク → buffers.push_outbound(data)
//!   2. ブリッジ → buffers.take_outbound()  （取り出しとクリアを一度に行う）
//!   3. ブリッジ → セキュアチャンネルへ送信
//!
//! 受信 (peer → device):
//!   1. セキュアチャンネル → ブリッジ
//!   2. ブリッジ → buffers.append_inbound(data)
//!   3. UART 送信タスク → buffers.drain_inbound()
//! ```
//!
//! ## 共有
//!
//! 一つの `DeviceBuffers` を `Arc` で全セッションと UART ドライバが共有する。
//! 各方向は独立した `Spinlock` で保護され、取り出しと追記はロック内で完結するので
//! 更新が失われることはない。

#![no_std]
extern crate alloc;

pub mod device;

pub use device::{DeviceBuffers, DeviceStats};

/// ステージングバッファのデフォルト容量（バイト）
pub const DEFAULT_STAGING_CAPACITY: usize = 2048;

/// 設定で指定できるステージングバッファ容量の上限（バイト）
pub const MAX_STAGING_CAPACITY: usize = 64 * 1024;
