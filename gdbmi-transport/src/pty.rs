//! 疑似端末
//!
//! デバッグ対象の入出力をデバッガとは別の端末に接続するために使います。

use crate::Result;
use nix::pty::openpty;
use std::os::fd::{AsRawFd, OwnedFd};

/// 開いた疑似端末の組
#[derive(Debug)]
pub struct Pty {
    pub master: OwnedFd,
    pub slave: OwnedFd,
}

impl Pty {
    /// 疑似端末を開く
    pub fn open() -> Result<Self> {
        let result = openpty(None, None)?;
        Ok(Self {
            master: result.master,
            slave: result.slave,
        })
    }

    /// 他のプロセスから開けるスレーブ側のパス
    ///
    /// このプロセスの fd テーブル経由のパスなので、[`Pty`] が生きている間だけ有効です。
    pub fn slave_path(&self) -> String {
        format!("/proc/{}/fd/{}", std::process::id(), self.slave.as_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_path_points_into_proc() {
        let pty = Pty::open().unwrap();
        let path = pty.slave_path();
        assert!(path.starts_with(&format!("/proc/{}/fd/", std::process::id())));
        assert!(std::path::Path::new(&path).exists());
    }
}
