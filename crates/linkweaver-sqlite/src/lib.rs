//! linkweaver-sqlite
//!
//! `linkweaver_core::ports::Store` の SQLite 実装。
//!
//! # 使い方
//! ```ignore
//! let store = SqliteStore::connect("sqlite://linkweaver.db?mode=rwc").await?;
//! let store: Arc<dyn Store> = Arc::new(store);
//! ```

mod schema;
mod store;

pub use self::store::SqliteStore;

#[cfg(test)]
mod tests;
