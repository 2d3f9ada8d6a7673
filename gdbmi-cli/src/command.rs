//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// MIコマンドをそのまま送信（`-` で始まる行）
    Raw(String),
    /// ブレークポイントを設定
    Break(String),
    /// 実行継続
    Continue,
    /// プログラムを実行
    Run,
    /// 現在の関数から戻る
    Return(Option<String>),
    /// 実行中のターゲットを中断
    Interrupt,
    /// CLIコマンドを実行してコンソール出力を表示
    Console(String),
    /// デバッグ対象の入出力を疑似端末に向ける
    Tty,
    /// ブレークポイント一覧
    Breakpoints,
    /// スレッドグループ一覧
    Groups,
    /// 実行状態と追跡中のコマンド
    State,
    /// 届いているレコードを読み込む
    Pump,
    /// コマンドの追跡をやめる
    Forget(u64),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.starts_with('-') {
            return Some(Command::Raw(input.to_string()));
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }
        let rest = || parts[1..].join(" ");

        match parts[0] {
            "break" | "b" => {
                if parts.len() > 1 {
                    Some(Command::Break(rest()))
                } else {
                    None
                }
            }
            "continue" | "c" => Some(Command::Continue),
            "run" | "r" => Some(Command::Run),
            "return" => {
                if parts.len() > 1 {
                    Some(Command::Return(Some(rest())))
                } else {
                    Some(Command::Return(None))
                }
            }
            "interrupt" | "int" => Some(Command::Interrupt),
            "console" | "cli" => {
                if parts.len() > 1 {
                    Some(Command::Console(rest()))
                } else {
                    None
                }
            }
            "tty" => Some(Command::Tty),
            "breakpoints" | "bps" => Some(Command::Breakpoints),
            "groups" => Some(Command::Groups),
            "state" => Some(Command::State),
            "pump" | "p" => Some(Command::Pump),
            "forget" => parts.get(1).and_then(|t| t.parse().ok()).map(Command::Forget),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("continue"), Some(Command::Continue));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("run"), Some(Command::Run));
        assert_eq!(Command::parse("state"), Some(Command::State));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("frobnicate"), None);
    }

    #[test]
    fn test_parse_commands_with_arguments() {
        assert_eq!(
            Command::parse("break orchard.c:42"),
            Some(Command::Break("orchard.c:42".to_string()))
        );
        assert_eq!(Command::parse("break"), None);
        assert_eq!(Command::parse("return"), Some(Command::Return(None)));
        assert_eq!(
            Command::parse("return  0"),
            Some(Command::Return(Some("0".to_string())))
        );
        assert_eq!(
            Command::parse("console info   types"),
            Some(Command::Console("info types".to_string()))
        );
        assert_eq!(Command::parse("forget 12"), Some(Command::Forget(12)));
        assert_eq!(Command::parse("forget x"), None);
    }

    #[test]
    fn test_parse_raw_mi() {
        assert_eq!(
            Command::parse("  -data-evaluate-expression \"a b\" "),
            Some(Command::Raw("-data-evaluate-expression \"a b\"".to_string()))
        );
    }
}
