pub mod app_model;

pub use app_model::{App, ChatSession};
