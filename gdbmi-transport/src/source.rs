//! 読み込み側の抽象化

use crate::Result;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// 読み込み可能になるまでの待ち方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// 待たない（外部のスケジューラに組み込む場合）
    Immediate,
    /// 指定時間まで待つ
    Timeout(Duration),
    /// 読み込み可能になるまで待つ
    Forever,
}

impl Wait {
    fn poll_timeout(self) -> PollTimeout {
        match self {
            Wait::Immediate => PollTimeout::ZERO,
            Wait::Timeout(d) => PollTimeout::try_from(d).unwrap_or(PollTimeout::MAX),
            Wait::Forever => PollTimeout::NONE,
        }
    }
}

/// 1回の読み込みの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// バッファに書き込まれたバイト数
    Data(usize),
    /// 今は読めるデータがない
    Pending,
    /// ストリームが閉じられた
    Closed,
}

/// 非ブロッキングに読み込めるバイト列の供給元
///
/// 待機は [`wait_readable`](ByteSource::wait_readable) でのみ行い、
/// [`read_chunk`](ByteSource::read_chunk) はブロックしてはいけません。
pub trait ByteSource: Send {
    /// 読み込み可能になるまで待つ（閉じられた場合も読み込み可能とみなす）
    fn wait_readable(&mut self, wait: Wait) -> Result<bool>;

    /// 読み込めるだけ読み込む
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk>;

    /// 供給元（プロセスなど）がまだ生きているか
    fn is_alive(&mut self) -> bool {
        true
    }
}

/// poll(2) で待機するファイルディスクリプタベースの供給元
pub struct PollSource<R> {
    inner: R,
}

impl<R: Read + AsFd> PollSource<R> {
    /// ディスクリプタを非ブロッキングにして供給元を作成する
    pub fn new(inner: R) -> Result<Self> {
        set_nonblocking(&inner)?;
        Ok(Self { inner })
    }

    /// 内部のリーダーを取得する
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read + AsFd + Send> ByteSource for PollSource<R> {
    fn wait_readable(&mut self, wait: Wait) -> Result<bool> {
        let mut fds = [PollFd::new(self.inner.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, wait.poll_timeout()) {
            Ok(n) => Ok(n > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("poll failed: {}", e)),
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        loop {
            match self.inner.read(buf) {
                Ok(0) => return Ok(Chunk::Closed),
                Ok(n) => return Ok(Chunk::Data(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Chunk::Pending),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// poll(2) で書き込み可能になるのを待つ書き込み先
///
/// ソケットでは読み込み側と同じファイル記述を共有するため、書き込み側も非ブロッキングになります。
/// `WouldBlock` の間は書き込み可能になるまで待ち、ストリームの終了とは区別します。
pub struct PollSink<W> {
    inner: W,
}

impl<W: Write + AsFd> PollSink<W> {
    /// 書き込み先を作成する
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    fn wait_writable(&self) -> io::Result<()> {
        let mut fds = [PollFd::new(self.inner.as_fd(), PollFlags::POLLOUT)];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl<W: Write + AsFd> Write for PollSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.inner.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.wait_writable()?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                written => return written,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        loop {
            match self.inner.flush() {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.wait_writable()?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                flushed => return flushed,
            }
        }
    }
}

/// O_NONBLOCK を設定する
fn set_nonblocking(fd: &impl AsFd) -> Result<()> {
    let raw = fd.as_fd().as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// 読み込み側と書き込み側の組
pub struct Transport {
    pub source: Box<dyn ByteSource>,
    pub sink: Box<dyn Write + Send>,
}

impl Transport {
    /// 供給元と書き込み先からトランスポートを作成する
    pub fn new(source: impl ByteSource + 'static, sink: impl Write + Send + 'static) -> Self {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }

    /// TCPで接続する
    pub fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let writer = PollSink::new(stream.try_clone()?);
        Ok(Self::new(PollSource::new(stream)?, writer))
    }

    /// Unixドメインソケットで接続する
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        let writer = PollSink::new(stream.try_clone()?);
        Ok(Self::new(PollSource::new(stream)?, writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_source_over_socketpair() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let mut source = PollSource::new(b).unwrap();
        let mut buf = [0u8; 64];

        assert!(!source.wait_readable(Wait::Immediate).unwrap());
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Chunk::Pending);

        a.write_all(b"(gdb)\n").unwrap();
        assert!(source.wait_readable(Wait::Timeout(Duration::from_secs(1))).unwrap());
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Chunk::Data(6));
        assert_eq!(&buf[..6], b"(gdb)\n");

        drop(a);
        assert!(source.wait_readable(Wait::Forever).unwrap());
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Chunk::Closed);
    }

    #[test]
    fn test_poll_sink_waits_for_slow_reader() {
        let (mut peer, ours) = UnixStream::pair().unwrap();
        let writer = ours.try_clone().unwrap();
        // 読み込み側を作ると同じファイル記述の書き込み側も非ブロッキングになる
        let _source = PollSource::new(ours).unwrap();
        let mut sink = PollSink::new(writer);

        let line = format!("{}\n", "x".repeat(4096));
        let total = line.len() * 256;
        let reader = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            let mut received = vec![0u8; total];
            peer.read_exact(&mut received).unwrap();
            received.iter().filter(|&&b| b == b'\n').count()
        });

        for _ in 0..256 {
            sink.write_all(line.as_bytes()).unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(reader.join().unwrap(), 256);
    }
}
