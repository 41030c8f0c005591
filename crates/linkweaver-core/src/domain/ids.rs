//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! タスクとリンク候補は ULID (Universally Unique Lexicographically Sortable
//! Identifier) で識別します。生成順にソートできるので、ストア側の
//! 「作成順で最古のものを取る」クエリのタイブレークにそのまま使えます。
//!
//! `Id<T>` の `T` は実行時には使わないマーカー型で、`TaskId` と `LinkId`
//! を取り違えるとコンパイルエラーになります。
//!
//! Document はコーパス側が採番する整数 ID なので、別の newtype (`DocumentId`)。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / FromStr で使うプレフィックス（"task-", "link-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// ID 文字列のパース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id '{0}'")]
pub struct ParseIdError(pub String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// プレフィックス付き（`task-01H...`）でも素の ULID でも受け付ける
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// AnalysisTask のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// LinkCandidate のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Link {}

impl IdMarker for Link {
    fn prefix() -> &'static str {
        "link-"
    }
}

pub type TaskId = Id<Task>;
pub type LinkId = Id<Link>;

/// Corpus-assigned document identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl DocumentId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let link = LinkId::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(link.as_ulid(), ulid2);
        assert!(task.to_string().starts_with("task-"));
        assert!(link.to_string().starts_with("link-"));

        // let _: TaskId = link; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_prefixed_strings() {
        let link_id = LinkId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&link_id).unwrap();
        assert!(serialized.starts_with("\"link-"));

        let deserialized: LinkId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(link_id, deserialized);
    }

    #[test]
    fn parse_accepts_prefixed_and_bare_ulids() {
        let ulid = Ulid::new();
        let prefixed: TaskId = format!("task-{ulid}").parse().unwrap();
        let bare: TaskId = ulid.to_string().parse().unwrap();

        assert_eq!(prefixed, bare);
        assert!("task-not-a-ulid".parse::<TaskId>().is_err());
    }

    #[test]
    fn document_id_is_transparent_in_json() {
        let json = serde_json::to_string(&DocumentId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
