//! エンティティ・ドキュメント・ビュー・アクティビティ間の変換。
//!
//! すべて副作用のない関数で、ストアや外部呼び出しには触れない。

pub mod activity;
pub mod comment;
pub mod post;
