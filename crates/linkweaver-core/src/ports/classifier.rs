//! Classifier port - 外部の関連判定サービス
//!
//! 呼び出し側（analyzer）は失敗したペアを飛ばして次へ進みます。
//! 実装側で黙ってリトライしてはいけません。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Classification, ClassificationRequest};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparseable classifier response: {0}")]
    Parse(String),

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Classifier は 2 文書を比較してリンク判定を返す
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError>;
}
