//! ブレークポイント管理

use crate::errors::SessionError;
use gdbmi_record::{Map, Value};
use std::collections::BTreeMap;

/// ブレークポイント
///
/// フィールドは観測のたびにマージされ、一度現れたフィールドが消えることはありません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub number: String,
    pub fields: Map,
}

impl Breakpoint {
    /// const のフィールドを取得する
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// 有効かどうか（`enabled="y"`）
    pub fn is_enabled(&self) -> bool {
        self.field("enabled") == Some("y")
    }

    /// ヒット回数
    pub fn hit_count(&self) -> Option<u64> {
        self.field("times")?.parse().ok()
    }
}

/// ブレークポイント番号を整数として解釈する
///
/// 複数ロケーションの `"2.1"` のような番号は親の番号 `2` になります。
pub fn parse_number(number: &str) -> Result<u32, SessionError> {
    let major = number.split('.').next().unwrap_or(number);
    major
        .parse()
        .map_err(|_| SessionError::InvalidField {
            field: "number",
            value: number.to_string(),
        })
}

/// ブレークポイントテーブル
#[derive(Debug, Default)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<String, Breakpoint>,
}

impl BreakpointTable {
    /// 新しいブレークポイントテーブルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// `bkpt` のフィールドをマージする（無ければ作成する）
    pub fn merge(&mut self, info: &Map) -> Result<&Breakpoint, SessionError> {
        let number = info
            .get("number")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::MissingField {
                what: "bkpt".to_string(),
                field: "number",
            })?
            .to_string();

        let bp = self
            .breakpoints
            .entry(number.clone())
            .or_insert_with(|| Breakpoint {
                number,
                fields: Map::new(),
            });
        bp.fields
            .extend(info.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(bp)
    }

    /// ブレークポイントを取得する
    pub fn get(&self, number: &str) -> Option<&Breakpoint> {
        self.breakpoints.get(number)
    }

    /// 全てのブレークポイントを番号順に取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        let mut all: Vec<&Breakpoint> = self.breakpoints.values().collect();
        all.sort_by_key(|bp| {
            let mut parts = bp.number.split('.').map(|p| p.parse::<u32>().unwrap_or(u32::MAX));
            (parts.next(), parts.next())
        });
        all.into_iter()
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, &str)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_merge_creates_then_enriches() {
        let mut table = BreakpointTable::new();
        table
            .merge(&info(&[("number", "3"), ("type", "breakpoint"), ("enabled", "y")]))
            .unwrap();
        let bp = table.merge(&info(&[("number", "3"), ("enabled", "n")])).unwrap();

        assert_eq!(bp.field("type"), Some("breakpoint"));
        assert_eq!(bp.field("enabled"), Some("n"));
        assert!(!bp.is_enabled());
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let update = info(&[("number", "1"), ("times", "2"), ("func", "main")]);

        let mut once = BreakpointTable::new();
        once.merge(&update).unwrap();

        let mut twice = BreakpointTable::new();
        twice.merge(&update).unwrap();
        twice.merge(&update).unwrap();

        assert_eq!(once.get("1"), twice.get("1"));
        assert_eq!(twice.get("1").unwrap().hit_count(), Some(2));
    }

    #[test]
    fn test_merge_requires_number() {
        let mut table = BreakpointTable::new();
        let err = table.merge(&info(&[("type", "breakpoint")])).unwrap_err();
        assert!(matches!(err, SessionError::MissingField { field: "number", .. }));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_all_is_numerically_ordered() {
        let mut table = BreakpointTable::new();
        for n in ["10", "2", "2.1", "1"] {
            table.merge(&info(&[("number", n)])).unwrap();
        }
        let numbers: Vec<&str> = table.all().map(|bp| bp.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2", "2.1", "10"]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("3").unwrap(), 3);
        assert_eq!(parse_number("2.1").unwrap(), 2);
        assert!(parse_number("x").is_err());
    }
}
