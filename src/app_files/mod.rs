//! 应用文件存储模块
//!
//! 每个应用（App）拥有一组以规范路径为键的文本文件，保存在 SQLite 中：
//!
//! ```text
//! app_files
//! ├── (app-1, /index.html)
//! ├── (app-1, /src/App.tsx)
//! └── (app-2, /README.md)
//! ```
//!
//! 所有路径都经过 [`path_guard`] 校验，任何逃逸应用根目录的输入在触碰存储前就会被拒绝。

pub mod path_guard;
pub mod storage;
pub mod types;

pub use path_guard::PathError;
pub use storage::{canonical_file_path, AppFileStore};
pub use types::*;
