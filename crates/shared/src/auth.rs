//! Google API 访问令牌
//!
//! 通过 `AccessTokenProvider` trait 抽象令牌来源，Firestore 与 FCM 客户端
//! 只依赖该 trait。生产环境从元数据服务获取并缓存令牌，本地开发使用固定令牌，
//! 访问模拟器时不携带令牌。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{AuthConfig, AuthMode};
use crate::error::{PlatformError, Result};

/// 令牌到期前提前刷新的余量，避免请求途中令牌失效
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// 访问令牌提供者
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// 返回 Bearer 令牌；`None` 表示请求不携带 Authorization 头
    async fn access_token(&self) -> Result<Option<String>>;
}

/// 为请求附加 Authorization 头
pub async fn authorize(
    request: reqwest::RequestBuilder,
    provider: &dyn AccessTokenProvider,
) -> Result<reqwest::RequestBuilder> {
    Ok(match provider.access_token().await? {
        Some(token) => request.bearer_auth(token),
        None => request,
    })
}

/// 根据配置构建令牌提供者
pub fn provider_from_config(
    config: &AuthConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn AccessTokenProvider>> {
    let provider: Arc<dyn AccessTokenProvider> = match config.mode {
        AuthMode::Metadata => Arc::new(MetadataTokenProvider::new(
            client,
            config.metadata_url.clone(),
        )),
        AuthMode::Static => {
            let token = config
                .static_token
                .clone()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    PlatformError::InvalidArgument(
                        "auth.mode=static 时必须配置 auth.static_token".to_string(),
                    )
                })?;
            Arc::new(StaticTokenProvider::new(token))
        }
        AuthMode::None => Arc::new(NoAuth),
    };

    info!(mode = ?config.mode, "访问令牌提供者已初始化");
    Ok(provider)
}

// ---------------------------------------------------------------------------
// 固定令牌
// ---------------------------------------------------------------------------

/// 固定令牌提供者
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(Some(self.token.clone()))
    }
}

// ---------------------------------------------------------------------------
// 无鉴权
// ---------------------------------------------------------------------------

/// 不携带令牌，用于 Firestore 模拟器
pub struct NoAuth;

#[async_trait]
impl AccessTokenProvider for NoAuth {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// 元数据服务
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// 元数据服务令牌提供者
///
/// 令牌缓存在进程内，到期前 60 秒内的调用会触发刷新。
/// 刷新期间持有锁，并发调用方等待同一次刷新结果。
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<MetadataTokenResponse> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| PlatformError::Auth(format!("请求元数据服务失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Auth(format!(
                "元数据服务返回 HTTP {status}: {body}"
            )));
        }

        response
            .json::<MetadataTokenResponse>()
            .await
            .map_err(|e| PlatformError::Auth(format!("元数据服务响应解析失败: {e}")))
    }
}

#[async_trait]
impl AccessTokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref()
            && Instant::now() + REFRESH_MARGIN < entry.expires_at
        {
            return Ok(Some(entry.token.clone()));
        }

        let fetched = self.fetch().await?;
        debug!(expires_in = fetched.expires_in, "已刷新访问令牌");

        let token = fetched.access_token.clone();
        *cached = Some(CachedToken {
            token: fetched.access_token,
            expires_at: Instant::now() + Duration::from_secs(fetched.expires_in),
        });

        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_provider() {
        let provider = StaticTokenProvider::new("local-token");
        let token = provider.access_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("local-token"));
    }

    #[tokio::test]
    async fn test_no_auth_provider() {
        let token = NoAuth.access_token().await.unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn test_static_mode_requires_token() {
        let config = AuthConfig {
            mode: AuthMode::Static,
            static_token: None,
            ..Default::default()
        };
        let result = provider_from_config(&config, reqwest::Client::new());
        assert!(matches!(result, Err(PlatformError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_provider_from_config_static() {
        let config = AuthConfig {
            mode: AuthMode::Static,
            static_token: Some("dev".to_string()),
            ..Default::default()
        };
        let provider = provider_from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(provider.access_token().await.unwrap().as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn test_authorize_without_token_leaves_request_untouched() {
        let client = reqwest::Client::new();
        let request = authorize(client.get("http://localhost/"), &NoAuth)
            .await
            .unwrap()
            .build()
            .unwrap();
        assert!(request.headers().get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_authorize_with_token_sets_bearer() {
        let client = reqwest::Client::new();
        let provider = StaticTokenProvider::new("abc");
        let request = authorize(client.get("http://localhost/"), &provider)
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer abc"
        );
    }
}
