//! 访问令牌校验
//!
//! 令牌的签发与轮换不在本服务职责内，这里只消费 `verify(token) -> userId`。

use crate::config::AuthConfig;
use async_trait::async_trait;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// 令牌校验器
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// 校验令牌，成功返回用户 ID
    async fn verify(&self, token: &str) -> Option<String>;
}

/// 基于配置文件的静态令牌表
pub struct StaticTokenVerifier {
    entries: Vec<(String, String)>,
}

impl StaticTokenVerifier {
    pub fn new<I, T, U>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(token, user)| (token.into(), user.into()))
                .collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.tokens.is_empty() {
            tracing::warn!("[Auth] 未配置任何访问令牌，所有连接都将被拒绝");
        }
        Self::new(
            config
                .tokens
                .iter()
                .map(|entry| (entry.token.clone(), entry.user_id.clone())),
        )
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        // 遍历全部条目，不在命中时提前返回
        let mut matched = None;
        for (expected, user_id) in &self.entries {
            if token_matches(token, expected) && matched.is_none() {
                matched = Some(user_id.clone());
            }
        }
        matched
    }
}

fn token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// 从请求头提取 Bearer 令牌
///
/// 支持 `Authorization: Bearer <token>`，也接受不带前缀的原始令牌。
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = match value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
    {
        Some(rest) => rest.trim(),
        None if value.trim().eq_ignore_ascii_case("bearer") => "",
        None => value.trim(),
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
