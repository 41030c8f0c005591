//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（永続ストア、分類サービス、時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ストアが唯一の正本。エンティティの状態を呼び出しをまたいでキャッシュしない
//! - ワーカー間の協調はストアの条件付き書き込みだけで行う

pub mod classifier;
pub mod clock;
pub mod id_generator;
pub mod store;

pub use self::classifier::{Classifier, ClassifyError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{DocumentStore, LinkStore, Store, StoreError, TaskStore};
