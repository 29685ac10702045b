//! 服务层模块
//!
//! 流水线执行与结构检查

pub mod checks;
pub mod pipeline;
