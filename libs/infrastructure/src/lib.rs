//! # infrastructure — コラボレータ実装
//!
//! `reel_core` のトレイトに対する具体実装を配置する。

pub mod narration_actor;
pub mod news_desk;
pub mod news_wire;
pub mod preloader;
pub mod wav;
