//! セッションの設定

use std::time::Duration;

/// セッションの設定
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `wait_for` が1回の読み込みで待つ時間
    pub poll_interval: Duration,
    /// `bkptno` 付きの停止の後に自動で実行を継続するか
    pub resume_after_breakpoint: bool,
    /// 1回の読み込みで受け取る最大バイト数
    pub read_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            resume_after_breakpoint: true,
            read_chunk_size: 4096,
        }
    }
}
