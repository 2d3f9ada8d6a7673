//! プロセス内チャネルのトランスポート
//!
//! 別スレッドから受信バイト列を流し込み、送信されたバイト列を記録します。
//! 実デバッガを使わずにセッションを駆動する場合に使います。

use crate::source::{ByteSource, Chunk, Transport, Wait};
use crate::Result;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

/// チャネルへの書き込み側
#[derive(Debug, Clone)]
pub struct ChannelFeeder {
    tx: Sender<Vec<u8>>,
}

impl ChannelFeeder {
    /// バイト列を流し込む（受信側が無くなっていれば false）
    pub fn feed(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(bytes.into()).is_ok()
    }

    /// 1行を改行付きで流し込む
    pub fn feed_line(&self, line: &str) -> bool {
        self.feed(format!("{}\n", line))
    }
}

/// チャネルから読み込む供給元
///
/// すべての [`ChannelFeeder`] が破棄されるとストリームは閉じられます。
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: bool,
}

/// 新しいチャネルを作成する
pub fn channel() -> (ChannelFeeder, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (
        ChannelFeeder { tx },
        ChannelSource {
            rx,
            pending: Vec::new(),
            closed: false,
        },
    )
}

impl ChannelSource {
    fn accept(&mut self, received: std::result::Result<Vec<u8>, bool>) -> bool {
        match received {
            Ok(bytes) => {
                self.pending.extend_from_slice(&bytes);
                true
            }
            Err(disconnected) => {
                self.closed |= disconnected;
                self.closed
            }
        }
    }
}

impl ByteSource for ChannelSource {
    fn wait_readable(&mut self, wait: Wait) -> Result<bool> {
        if !self.pending.is_empty() || self.closed {
            return Ok(true);
        }
        let received = match wait {
            Wait::Immediate => self.rx.try_recv().map_err(|e| e == TryRecvError::Disconnected),
            Wait::Timeout(d) => self
                .rx
                .recv_timeout(d)
                .map_err(|e| e == RecvTimeoutError::Disconnected),
            Wait::Forever => self.rx.recv().map_err(|_| true),
        };
        Ok(self.accept(received))
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        loop {
            match self.rx.try_recv() {
                Ok(bytes) => self.pending.extend_from_slice(&bytes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        if self.pending.is_empty() {
            return Ok(if self.closed { Chunk::Closed } else { Chunk::Pending });
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(Chunk::Data(n))
    }

    fn is_alive(&mut self) -> bool {
        !self.closed
    }
}

/// 書き込まれたバイト列を共有バッファに記録する書き込み先
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedSink {
    /// 新しい書き込み先を作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに書き込まれた内容
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// これまでに書き込まれた行
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport {
    /// プロセス内チャネルのトランスポートを作成する
    pub fn in_memory() -> (Transport, ChannelFeeder, SharedSink) {
        let (feeder, source) = channel();
        let sink = SharedSink::new();
        (Transport::new(source, sink.clone()), feeder, sink)
    }
}
