//! 数据模型模块
//! 与后端 JSON 结构一一对应

pub mod auth;
pub mod entry;
pub mod retrospect;
pub mod user;
