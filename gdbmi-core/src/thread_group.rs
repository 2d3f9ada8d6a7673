//! スレッドグループ管理

use crate::errors::SessionError;
use gdbmi_record::Map;
use std::collections::{BTreeMap, BTreeSet};

/// スレッドグループ（デバッグ対象のプロセス1つに対応する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadGroup {
    pub id: String,
    /// `thread-group-started` を受け取るまでは None
    pub pid: Option<u32>,
    pub threads: BTreeSet<String>,
    /// ライブラリIDからライブラリ情報へのマッピング
    pub libraries: BTreeMap<String, Map>,
}

impl ThreadGroup {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            pid: None,
            threads: BTreeSet::new(),
            libraries: BTreeMap::new(),
        }
    }
}

/// スレッドグループテーブル
///
/// どの更新も同じ内容を2回適用しても結果は変わりません。
#[derive(Debug, Default)]
pub struct ThreadGroupTable {
    groups: BTreeMap<String, ThreadGroup>,
}

impl ThreadGroupTable {
    /// 新しいテーブルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// グループを追加する（既にあれば既存のものを返す）
    pub fn add(&mut self, id: &str) -> &ThreadGroup {
        self.groups
            .entry(id.to_string())
            .or_insert_with(|| ThreadGroup::new(id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut ThreadGroup, SessionError> {
        self.groups
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownThreadGroup(id.to_string()))
    }

    /// プロセスの開始を記録する
    pub fn start(&mut self, id: &str, pid: &str) -> Result<&ThreadGroup, SessionError> {
        let pid = pid.parse().map_err(|_| SessionError::InvalidField {
            field: "pid",
            value: pid.to_string(),
        })?;
        let group = self.get_mut(id)?;
        group.pid = Some(pid);
        Ok(group)
    }

    /// スレッドの作成を記録する
    pub fn add_thread(&mut self, id: &str, thread: &str) -> Result<&ThreadGroup, SessionError> {
        let group = self.get_mut(id)?;
        group.threads.insert(thread.to_string());
        Ok(group)
    }

    /// ライブラリのロードを記録する
    pub fn load_library(
        &mut self,
        id: &str,
        library: &str,
        info: &Map,
    ) -> Result<&ThreadGroup, SessionError> {
        let group = self.get_mut(id)?;
        group.libraries.insert(library.to_string(), info.clone());
        Ok(group)
    }

    /// グループを取得する
    pub fn get(&self, id: &str) -> Option<&ThreadGroup> {
        self.groups.get(id)
    }

    /// 全てのグループを取得する
    pub fn all(&self) -> impl Iterator<Item = &ThreadGroup> {
        self.groups.values()
    }

    /// グループの数を取得する
    pub fn count(&self) -> usize {
        self.groups.len()
    }
}
