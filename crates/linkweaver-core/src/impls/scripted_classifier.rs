//! ScriptedClassifier - 決め打ちの応答を返す分類器
//!
//! テストとデモ用。(source 名, target 名) ごとに応答を登録し、
//! 未登録のペアには「リンクしない」を返します。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Classification, ClassificationRequest};
use crate::ports::{Classifier, ClassifyError};

#[derive(Debug, Clone)]
enum Scripted {
    Answer(Classification),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    responses: HashMap<(String, String), Scripted>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        answer: Classification,
    ) -> Self {
        self.responses
            .insert((source.into(), target.into()), Scripted::Answer(answer));
        self
    }

    pub fn fail(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.responses
            .insert((source.into(), target.into()), Scripted::Fail(message.into()));
        self
    }

    /// Sleep before every answer (simulates a slow remote call).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        request: ClassificationRequest<'_>,
    ) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (request.source_name.to_string(), request.target_name.to_string());
        match self.responses.get(&key) {
            Some(Scripted::Answer(answer)) => Ok(answer.clone()),
            Some(Scripted::Fail(message)) => Err(ClassifyError::Request(message.clone())),
            None => Ok(Classification::no_link("unrelated")),
        }
    }
}
