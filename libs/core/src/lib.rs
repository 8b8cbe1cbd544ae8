//! # reel-core
//!
//! NewsreelFactory のドメイン契約・エラー型・コラボレータトレイトを定義する。
//! 具体実装は `libs/infrastructure` に配置する（依存性逆転の原則）。

pub mod contracts;
pub mod error;
pub mod traits;
