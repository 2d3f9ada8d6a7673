//! GDB/MI レコードの解析
//!
//! このクレートは、GDB/MI のワイヤ形式の1行を型付きの [`Record`] に変換する機能を提供します。
//! 相関トークン、再帰的な値文法（const / list / tuple）、レコードの直列化を扱います。

pub mod errors;
pub mod parser;
pub mod record;
pub mod token;
pub mod value;

pub use errors::ParseError;
pub use parser::{parse_line, parse_list, parse_tuple, parse_value};
pub use record::{Record, RecordKind};
pub use token::Token;
pub use value::{Map, Value};
