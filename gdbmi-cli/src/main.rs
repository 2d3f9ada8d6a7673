//! gdbmi CLI - コマンドラインインターフェース
//!
//! GDB/MI セッションを対話的に操作するためのREPL

mod command;

use anyhow::Result;
use clap::{Parser, Subcommand};
use command::Command;
use gdbmi_core::{
    CommandState, GdbCommand, GdbProcess, InferiorTty, Record, RecordKind, Session,
    SessionConfig, Token, Transport, Value, Wait,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 各コマンドの結果を待つ時間
const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `pump` で追加の出力を待つ時間
const PUMP_TIMEOUT: Duration = Duration::from_millis(200);

/// gdbmi - GDB/MI session driver
#[derive(Parser)]
#[command(name = "gdbmi")]
#[command(version = "0.1.0")]
#[command(about = "Interactive driver for a GDB/MI debugger session", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep the target stopped after a breakpoint hit
    #[arg(long, global = true)]
    stop_at_breakpoints: bool,

    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Launch a debugger on an executable
    Run {
        /// Path to the executable binary
        program: PathBuf,

        /// Debugger executable
        #[arg(long, default_value = "gdb")]
        gdb: PathBuf,

        /// MI interpreter version
        #[arg(long, default_value = "mi2")]
        interpreter: String,

        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Connect to a debugger already speaking MI on a socket
    Connect {
        /// host:port, or unix:<path> for a Unix socket
        addr: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!("gdbmi - GDB/MI session driver");
    println!("Version 0.1.0");
    println!();

    let config = SessionConfig {
        resume_after_breakpoint: !cli.stop_at_breakpoints,
        ..SessionConfig::default()
    };
    let mut repl = init_session(cli.command, config)?;
    repl.run()?;

    Ok(())
}

/// ログ出力を初期化する（REPLの出力と混ざらないよう stderr に出す）
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// デバッガを起動または接続してセッションを作成する
fn init_session(command: SessionCommand, config: SessionConfig) -> Result<Repl> {
    let (session, process) = match command {
        SessionCommand::Run {
            program,
            gdb,
            interpreter,
            args,
        } => {
            println!("Loading program: {}", program.display());
            let launch = GdbCommand::new(&gdb).interpreter(interpreter).program(&program);
            let (mut session, process) = Session::spawn(&launch, config)?;
            println!("Debugger started (pid {})", process.pid());

            if !args.is_empty() {
                let arguments = format!("-exec-arguments {}", args.join(" "));
                let token = session.send(&arguments, None, None)?;
                session.wait_for_timeout(Some(token), RESULT_TIMEOUT);
            }
            (session, Some(process))
        }
        SessionCommand::Connect { addr } => {
            let transport = match addr.strip_prefix("unix:") {
                Some(path) => Transport::connect_unix(path)?,
                None => Transport::connect_tcp(addr.as_str())?,
            };
            println!("Connected to {}", addr);
            (Session::new(transport, config), None)
        }
    };
    println!();

    let mut repl = Repl {
        session,
        process,
        ttys: Vec::new(),
    };
    repl.subscribe();
    Ok(repl)
}

/// レコードを表示する
fn print_record(token: Option<Token>, record: &Record) {
    match record.kind {
        RecordKind::ConsoleStream | RecordKind::TargetStream => print!("{}", record.what),
        RecordKind::LogStream => eprint!("{}", record.what),
        RecordKind::Terminator => {}
        _ => println!("{}", record.to_line(token)),
    }
}

/// REPLの状態
struct Repl {
    session: Session,
    /// 起動したデバッガ（接続した場合は None）
    process: Option<GdbProcess>,
    /// 作成した疑似端末（スレーブ側のパスは生きている間だけ有効）
    ttys: Vec<InferiorTty>,
}

impl Repl {
    /// 受信したレコードを表示するよう購読する
    fn subscribe(&mut self) {
        for kind in RecordKind::ALL {
            self.session.on_record(kind, Box::new(print_record));
        }
    }

    /// REPLループを実行する
    fn run(&mut self) -> Result<()> {
        println!("Type 'help' for available commands, 'quit' to exit.");
        println!();

        let history = home::home_dir().map(|home| home.join(".gdbmi_history"));
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = &history {
            if rl.load_history(path).is_err() {
                debug!("No history at {}", path.display());
            }
        }

        // 起動直後のバナーなどを読み捨てる
        self.pump(PUMP_TIMEOUT);

        loop {
            let readline = rl.readline("(gdbmi) ");
            match readline {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line)?;

                    if Command::parse(line) == Some(Command::Quit) {
                        println!("Goodbye!");
                        break;
                    }
                    if let Err(e) = self.handle_command(line) {
                        eprintln!("Error: {}", e);
                    }
                    if !self.session.is_running() {
                        println!("Debugger exited");
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &history {
            if let Err(e) = rl.save_history(path) {
                debug!("Failed to save history to {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, line: &str) -> Result<()> {
        let Some(command) = Command::parse(line) else {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
            return Ok(());
        };

        match command {
            Command::Raw(text) => {
                let token = self.session.send(&text, None, None)?;
                self.await_result(token);
            }
            Command::Break(location) => self.handle_break(&location)?,
            Command::Continue => {
                let token = self.session.sender().exec_continue(None)?;
                self.await_result(token);
            }
            Command::Run => {
                let token = self.session.sender().exec_run(None)?;
                self.await_result(token);
            }
            Command::Return(value) => {
                let token = self.session.sender().exec_return(value.as_deref(), None)?;
                self.await_result(token);
            }
            Command::Interrupt => self.handle_interrupt()?,
            Command::Console(query) => {
                let text = self.session.console_exec(&query)?;
                if text.is_empty() {
                    println!("(no console output)");
                }
            }
            Command::Tty => {
                let tty = self.session.inferior_tty_set()?;
                println!("Inferior I/O redirected to {}", tty.pty.slave_path());
                self.await_result(tty.token);
                self.ttys.push(tty);
            }
            Command::Breakpoints => self.print_breakpoints(),
            Command::Groups => self.print_groups(),
            Command::State => self.print_state(),
            Command::Pump => {
                let count = self.pump(PUMP_TIMEOUT);
                println!("{} record(s) read", count);
            }
            Command::Forget(token) => {
                if self.session.forget(Token::new(token)) {
                    println!("Forgot command [{}]", Token::new(token));
                } else {
                    println!("No command [{}]", Token::new(token));
                }
            }
            Command::Help => print_help(),
            Command::Quit => {}
        }

        Ok(())
    }

    /// Breakコマンドを処理する
    fn handle_break(&mut self, location: &str) -> Result<()> {
        let token = self.session.add_breakpoint(
            location,
            Some(Box::new(|number, args| {
                let func = args
                    .get("frame")
                    .and_then(|frame| frame.get("func"))
                    .and_then(Value::as_str)
                    .unwrap_or("??");
                println!();
                println!("Breakpoint {} hit in {}", number, func);
            })),
        )?;
        if self.await_result(token) {
            match self.session.command(token).map(|info| info.state) {
                Some(CommandState::Done) => println!("Breakpoint set at '{}'", location),
                _ => println!("Breakpoint not set at '{}'", location),
            }
        }
        Ok(())
    }

    /// 実行中のターゲットを中断する
    fn handle_interrupt(&mut self) -> Result<()> {
        match &self.process {
            // 実行中は MI コマンドを受け付けないことがあるので、シグナルで止める
            Some(process) => {
                process.interrupt()?;
                info!("Sent SIGINT to debugger {}", process.pid());
                self.pump(PUMP_TIMEOUT);
            }
            None => {
                let token = self.session.sender().exec_interrupt(None)?;
                self.await_result(token);
            }
        }
        Ok(())
    }

    /// コマンドの結果を待つ（届いたら true）
    fn await_result(&mut self, token: Token) -> bool {
        if !self.session.wait_for_timeout(Some(token), RESULT_TIMEOUT) {
            println!("No result for [{}] yet; use 'pump' to read more", token);
            return false;
        }
        // 結果に続く非同期レコードもまとめて表示する
        self.pump(Duration::ZERO);
        true
    }

    /// 届いているレコードを読み込む（各レコードは購読により表示される）
    fn pump(&mut self, timeout: Duration) -> usize {
        let wait = if timeout.is_zero() {
            Wait::Immediate
        } else {
            Wait::Timeout(timeout)
        };
        self.session.read(wait).count()
    }

    fn print_breakpoints(&self) {
        let breakpoints: Vec<_> = self.session.breakpoints().collect();
        if breakpoints.is_empty() {
            println!("No breakpoints");
            return;
        }

        println!("Breakpoints ({} found):", breakpoints.len());
        for bp in breakpoints {
            let location = bp
                .field("original-location")
                .or_else(|| bp.field("func"))
                .or_else(|| bp.field("addr"))
                .unwrap_or("??");
            let enabled = if bp.is_enabled() { "enabled" } else { "disabled" };
            println!(
                "  {}. {} ({}, hits: {})",
                bp.number,
                location,
                enabled,
                bp.hit_count().unwrap_or(0)
            );
        }
    }

    fn print_groups(&self) {
        let groups: Vec<_> = self.session.thread_groups().collect();
        if groups.is_empty() {
            println!("No thread groups");
            return;
        }

        println!("Thread groups ({} found):", groups.len());
        for group in groups {
            let pid = group
                .pid
                .map_or_else(|| "not started".to_string(), |pid| format!("pid {}", pid));
            println!(
                "  {} ({}, threads: {}, libraries: {})",
                group.id,
                pid,
                group.threads.len(),
                group.libraries.len()
            );
        }
    }

    fn print_state(&mut self) {
        match self.session.exec_state() {
            Some(state) => println!("Execution state: {}", state),
            None => println!("Execution state: unknown"),
        }
        println!("Started: {}", self.session.is_attached());
        println!("Debugger running: {}", self.session.is_running());

        let sender = self.session.sender();
        let tokens = sender.tokens();
        println!("Tracked commands ({}):", tokens.len());
        for info in tokens.into_iter().filter_map(|token| sender.command(token)) {
            println!("  [{}] {} ({})", info.token, info.text, info.state);
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help           - Show this help message");
    println!("  quit/exit/q    - Exit");
    println!();
    println!("Execution commands:");
    println!("  run (r)        - Run the program");
    println!("  continue (c)   - Continue execution");
    println!("  return [value] - Return from the current function");
    println!("  interrupt      - Interrupt the running target");
    println!("  break <loc>    - Set breakpoint and report hits");
    println!();
    println!("Session commands:");
    println!("  -<mi command>  - Send an MI command verbatim");
    println!("  console <cmd>  - Run a CLI command and show its output");
    println!("  tty            - Redirect program I/O to a new pseudo-terminal");
    println!("  breakpoints    - List breakpoints");
    println!("  groups         - List thread groups");
    println!("  state          - Show execution state and tracked commands");
    println!("  pump (p)       - Read pending debugger output");
    println!("  forget <token> - Stop tracking a command");
    println!();
    println!("Examples:");
    println!("  break main");
    println!("  -data-evaluate-expression argc");
    println!("  console info registers");
}
