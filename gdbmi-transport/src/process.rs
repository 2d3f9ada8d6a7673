//! デバッガの子プロセス

use crate::source::{ByteSource, Chunk, PollSource, Transport, Wait};
use crate::Result;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{info, warn};

/// 起動時に常に付けるフラグ
const STARTUP_FLAGS: [&str; 4] = ["--return-child-result", "--quiet", "--nx", "--nw"];

/// デバッガの起動方法
#[derive(Debug, Clone)]
pub struct GdbCommand {
    gdb: PathBuf,
    interpreter: String,
    program: Option<PathBuf>,
    args: Vec<OsString>,
}

impl GdbCommand {
    /// 起動するデバッガの実行ファイルを指定して作成する
    pub fn new(gdb: impl AsRef<Path>) -> Self {
        Self {
            gdb: gdb.as_ref().to_path_buf(),
            interpreter: "mi2".to_string(),
            program: None,
            args: Vec::new(),
        }
    }

    /// MIインタプリタのバージョンを指定する（例: `mi2`, `mi3`）
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// デバッグ対象のプログラムを指定する
    pub fn program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = Some(program.as_ref().to_path_buf());
        self
    }

    /// 追加の引数を渡す
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// デバッガに渡す引数の一覧
    pub fn command_line(&self) -> Vec<OsString> {
        let mut line: Vec<OsString> = STARTUP_FLAGS.iter().map(OsString::from).collect();
        line.push(format!("--interpreter={}", self.interpreter).into());
        line.extend(self.args.iter().cloned());
        if let Some(program) = &self.program {
            line.push(program.clone().into_os_string());
        }
        line
    }

    /// デバッガを起動し、標準入出力をトランスポートとして返す
    pub fn spawn(&self) -> Result<(GdbProcess, Transport)> {
        self.spawn_with(self.command_line())
    }

    fn spawn_with(&self, args: Vec<OsString>) -> Result<(GdbProcess, Transport)> {
        info!("Starting debugger: {} {:?}", self.gdb.display(), args);

        let mut child = Command::new(&self.gdb)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn '{}': {}", self.gdb.display(), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get debugger stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get debugger stdout"))?;

        let handle = GdbProcess {
            pid: Pid::from_raw(child.id() as i32),
        };
        let source = ProcessSource {
            stdout: PollSource::new(stdout)?,
            child,
        };
        Ok((handle, Transport::new(source, stdin)))
    }
}

impl Default for GdbCommand {
    fn default() -> Self {
        Self::new("gdb")
    }
}

/// 起動したデバッガへのハンドル
#[derive(Debug, Clone, Copy)]
pub struct GdbProcess {
    pid: Pid,
}

impl GdbProcess {
    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// デバッガに SIGINT を送って実行中のターゲットを中断させる
    pub fn interrupt(&self) -> Result<()> {
        kill(self.pid, Signal::SIGINT)?;
        Ok(())
    }
}

/// デバッガの標準出力を読む供給元
///
/// 子プロセスの生存確認もここで行います。
pub struct ProcessSource {
    stdout: PollSource<ChildStdout>,
    child: Child,
}

impl ByteSource for ProcessSource {
    fn wait_readable(&mut self, wait: Wait) -> Result<bool> {
        self.stdout.wait_readable(wait)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        self.stdout.read_chunk(buf)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill debugger: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let cmd = GdbCommand::new("arm-none-eabi-gdb")
            .interpreter("mi3")
            .arg("-ex")
            .arg("target remote :3333")
            .program("build/firmware.elf");

        let line: Vec<String> = cmd
            .command_line()
            .into_iter()
            .map(|s| s.into_string().unwrap())
            .collect();
        assert_eq!(
            line,
            vec![
                "--return-child-result",
                "--quiet",
                "--nx",
                "--nw",
                "--interpreter=mi3",
                "-ex",
                "target remote :3333",
                "build/firmware.elf",
            ]
        );
    }

    #[test]
    fn test_default_interpreter() {
        let line = GdbCommand::default().command_line();
        assert!(line.contains(&OsString::from("--interpreter=mi2")));
    }

    #[test]
    fn test_spawned_process_is_read_until_closed() {
        // MI の代わりに `sh` に固定の行を出力させる
        let (process, mut transport) = GdbCommand::new("sh")
            .spawn_with(vec!["-c".into(), "echo '(gdb)'".into()])
            .unwrap();
        assert!(process.pid() > 0);

        let mut collected = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            transport.source.wait_readable(Wait::Forever).unwrap();
            match transport.source.read_chunk(&mut buf).unwrap() {
                Chunk::Data(n) => collected.extend_from_slice(&buf[..n]),
                Chunk::Pending => continue,
                Chunk::Closed => break,
            }
        }
        assert_eq!(collected, b"(gdb)\n");
    }
}
