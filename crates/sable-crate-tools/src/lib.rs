//! Sable 工具集
//!
//! 目前只提供日志初始化，供 driver 以及各个 crate 的测试共用。

pub mod init_log;
