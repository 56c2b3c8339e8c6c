//! appcraft 核心服务
//!
//! AI 应用构建器的后端：按应用隔离的虚拟文件存储，以及带认证的流式对话通道。

pub mod app_files;
pub mod auth;
pub mod config;
pub mod database;
pub mod generation;
pub mod models;
pub mod server;
pub mod websocket;

pub use server::{build_router, run_server, AppState};
