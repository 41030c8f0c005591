//! Errors - 障害の運用分類
//!
//! タスクを失敗させるエラーは、ログ上この分類のどちらかに落ちます。
//! ペア単位の失敗（分類器の通信エラーなど）はここに来ず、そのペアだけ飛ばされます。

use serde::{Deserialize, Serialize};

/// ErrorKind は実行エラーの分類
///
/// - Precondition: 入力が処理できない（本文なしなど）。リトライしても結果は同じ
/// - Infrastructure: ストアの障害。タスクは失敗にしてプールは継続
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Precondition,
    Infrastructure,
}
