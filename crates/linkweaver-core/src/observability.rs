//! Observability - ログのターゲット
//!
//! `tracing` のイベントは層ごとに固定のターゲットで出します。
//! 購読側（`EnvFilter`）は `linkweaver::queue=debug` のように層単位で絞り込めます。
//! フィールド名は全層で `worker_id` / `task_id` / `document_id` / `target_id` /
//! `link_id` に揃えています。

/// Pool lifecycle: claims, completions, failures, idle exits.
pub const QUEUE_TARGET: &str = "linkweaver::queue";

/// Per-task and per-pair analysis.
pub const ANALYZER_TARGET: &str = "linkweaver::analyzer";

/// Reviewer actions and run control.
pub const CONTROL_TARGET: &str = "linkweaver::control";
