//! サーバー設定
//!
//! `key = value` 形式のテキストから `ServerConfig` を組み立てる。
//! ファイルの読み込み自体は組み込み先が行う。

use alloc::string::String;
use core::time::Duration;

use sshuart_session::{
    BridgeConfig, ConnectionAcceptor, ControlBytes, StatsFormat, MAX_BACKLOG_CAPACITY,
};
use sshuart_stream::MAX_STAGING_CAPACITY;

/// 設定ファイルのひな形
pub const DEFAULT_CONFIG: &str = r#"# SSH <-> UART bridge configuration

# TCP port for the embedding application's listener
port = 22222

# Echo bytes received from the peer back over the channel
echo = false

# Handshake attempt budget and per-attempt read wait
handshake_attempts = 100
handshake_poll_ms = 1000

# Serve more than one connection over the server's lifetime
multiple_connections = false
max_sessions = 4

# In-band control bytes
terminate_byte = 0x03
rekey_byte = 0x06
stats_byte = 0x05
stats_format = text
"#;

/// 設定のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `key = value` の形になっていない
    MissingSeparator { line: usize },
    /// 値を解釈できない
    InvalidValue { line: usize, key: String },
    /// 値の範囲が不正（0 や上限超え）
    OutOfRange { key: &'static str },
    /// 制御バイトが重複している
    DuplicateControlByte(u8),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::MissingSeparator { line } => {
                write!(f, "Line {}: expected `key = value`", line)
            }
            ConfigError::InvalidValue { line, key } => {
                write!(f, "Line {}: invalid value for `{}`", line, key)
            }
            ConfigError::OutOfRange { key } => write!(f, "`{}` is out of range", key),
            ConfigError::DuplicateControlByte(byte) => {
                write!(f, "Control byte 0x{:02x} is bound more than once", byte)
            }
        }
    }
}

/// サーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// 組み込み先が bind するポート（このクレートはソケットを開かない）
    pub port: u16,
    pub echo: bool,
    /// 認証前にピアへ表示するバナー
    pub banner: String,
    pub handshake_attempts: u32,
    pub handshake_poll_ms: u64,
    pub backlog_capacity: usize,
    pub read_chunk: usize,
    /// 同時に処理するセッション数の上限
    pub max_sessions: usize,
    /// false なら最初の接続を処理した時点で `serve` を終える
    pub multiple_connections: bool,
    /// チャンネル実装に渡す送信ハイウォーターマーク（0 で無効）
    pub highwater: u32,
    pub controls: ControlBytes,
    pub stats_format: StatsFormat,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 22222,
            echo: false,
            banner: String::from("SSH <-> UART bridge\r\n"),
            handshake_attempts: sshuart_session::DEFAULT_HANDSHAKE_ATTEMPTS,
            handshake_poll_ms: sshuart_session::DEFAULT_HANDSHAKE_POLL_MS,
            backlog_capacity: sshuart_session::DEFAULT_BACKLOG_CAPACITY,
            read_chunk: sshuart_session::DEFAULT_READ_CHUNK,
            max_sessions: 4,
            multiple_connections: false,
            highwater: 0x3FFF,
            controls: ControlBytes::default(),
            stats_format: StatsFormat::Text,
            inbound_capacity: sshuart_stream::DEFAULT_STAGING_CAPACITY,
            outbound_capacity: sshuart_stream::DEFAULT_STAGING_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定テキスト全体を解釈する
    ///
    /// 書かれていないキーはデフォルト値のまま。
    ///
    /// # エラー
    /// 最初に見つかった不正な行、または検証エラー
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (index, line) in text.lines().enumerate() {
            config.parse_line(index + 1, line)?;
        }
        config.validate()?;

        log::info!(
            "config loaded: port={} echo={} sessions={} multiple={}",
            config.port,
            config.echo,
            config.max_sessions,
            config.multiple_connections
        );
        Ok(config)
    }

    /// 1 行を解釈して反映する
    fn parse_line(&mut self, line_no: usize, line: &str) -> Result<(), ConfigError> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::MissingSeparator { line: line_no });
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        let invalid = || ConfigError::InvalidValue {
            line: line_no,
            key: key.clone(),
        };

        match key.as_str() {
            "port" => self.port = value.parse().map_err(|_| invalid())?,
            "echo" => self.echo = parse_bool(value).ok_or_else(invalid)?,
            "banner" => self.banner = unescape_crlf(value),
            "handshake_attempts" => self.handshake_attempts = value.parse().map_err(|_| invalid())?,
            "handshake_poll_ms" => self.handshake_poll_ms = value.parse().map_err(|_| invalid())?,
            "backlog_capacity" => self.backlog_capacity = value.parse().map_err(|_| invalid())?,
            "read_chunk" => self.read_chunk = value.parse().map_err(|_| invalid())?,
            "max_sessions" => self.max_sessions = value.parse().map_err(|_| invalid())?,
            "multiple_connections" => {
                self.multiple_connections = parse_bool(value).ok_or_else(invalid)?
            }
            "highwater" => self.highwater = parse_u32(value).ok_or_else(invalid)?,
            "terminate_byte" => self.controls.terminate = parse_byte(value).ok_or_else(invalid)?,
            "rekey_byte" => self.controls.rekey = parse_byte(value).ok_or_else(invalid)?,
            "stats_byte" => self.controls.stats = parse_byte(value).ok_or_else(invalid)?,
            "stats_format" => {
                self.stats_format = match value.to_lowercase().as_str() {
                    "text" => StatsFormat::Text,
                    "json" => StatsFormat::Json,
                    _ => return Err(invalid()),
                }
            }
            "inbound_capacity" => self.inbound_capacity = value.parse().map_err(|_| invalid())?,
            "outbound_capacity" => self.outbound_capacity = value.parse().map_err(|_| invalid())?,
            _ => log::warn!("line {}: unknown config key `{}` ignored", line_no, key),
        }
        Ok(())
    }

    /// 値の組み合わせを検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("handshake_attempts", self.handshake_attempts as usize),
            ("backlog_capacity", self.backlog_capacity),
            ("read_chunk", self.read_chunk),
            ("max_sessions", self.max_sessions),
        ];
        if let Some(&(key, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::OutOfRange { key });
        }

        let bounded = [
            ("backlog_capacity", self.backlog_capacity, MAX_BACKLOG_CAPACITY),
            ("inbound_capacity", self.inbound_capacity, MAX_STAGING_CAPACITY),
            ("outbound_capacity", self.outbound_capacity, MAX_STAGING_CAPACITY),
            ("read_chunk", self.read_chunk, self.backlog_capacity),
        ];
        if let Some(&(key, _, _)) = bounded.iter().find(|(_, value, max)| value > max) {
            return Err(ConfigError::OutOfRange { key });
        }

        let ControlBytes {
            terminate,
            rekey,
            stats,
        } = self.controls;
        if terminate == rekey || terminate == stats {
            return Err(ConfigError::DuplicateControlByte(terminate));
        }
        if rekey == stats {
            return Err(ConfigError::DuplicateControlByte(rekey));
        }
        Ok(())
    }

    /// セッションブリッジ用の設定
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            backlog_capacity: self.backlog_capacity,
            read_chunk: self.read_chunk,
            echo: self.echo,
            controls: self.controls,
            stats_format: self.stats_format,
        }
    }

    /// この設定でハンドシェイクの受け付け器を作る
    pub fn acceptor(&self) -> ConnectionAcceptor {
        ConnectionAcceptor::new(
            self.handshake_attempts,
            Duration::from_millis(self.handshake_poll_ms),
        )
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// 10 進数または `0x` 付きの 16 進数
fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_byte(s: &str) -> Option<u8> {
    parse_u32(s).and_then(|value| u8::try_from(value).ok())
}

/// バナー中の `\r` `\n` をエスケープ解除する
fn unescape_crlf(s: &str) -> String {
    s.replace("\\r", "\r").replace("\\n", "\n")
}
