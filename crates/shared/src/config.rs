//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Firestore 配置
///
/// 集合名与字段名可配置，默认值与移动端写入的文档结构一致
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database_id: String,
    /// 设置后改为访问本地模拟器（如 "localhost:8081"），并跳过鉴权
    pub emulator_host: Option<String>,
    pub users_collection: String,
    pub orders_collection: String,
    pub role_field: String,
    pub employee_role: String,
    pub token_field: String,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_id: "(default)".to_string(),
            emulator_host: None,
            users_collection: "users".to_string(),
            orders_collection: "orders".to_string(),
            role_field: "role".to_string(),
            employee_role: "employee".to_string(),
            token_field: "fcmToken".to_string(),
        }
    }
}

impl FirestoreConfig {
    /// REST API 根地址
    pub fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{host}/v1"),
            None => "https://firestore.googleapis.com/v1".to_string(),
        }
    }
}

/// FCM 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcmConfig {
    pub project_id: String,
    pub endpoint: String,
    /// 仅校验消息而不真正投递
    pub dry_run: bool,
    /// 单次多播内同时在途的请求数上限
    pub max_concurrency: usize,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            endpoint: "https://fcm.googleapis.com".to_string(),
            dry_run: false,
            max_concurrency: 10,
        }
    }
}

/// 访问令牌来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// 从 GCE / Cloud Run 元数据服务获取
    #[default]
    Metadata,
    /// 使用配置中的固定令牌（本地开发）
    Static,
    /// 不携带 Authorization 头（模拟器）
    None,
}

/// 鉴权配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub static_token: Option<String>,
    pub metadata_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Metadata,
            static_token: None,
            metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
                .to_string(),
        }
    }
}

/// 出站 HTTP 客户端配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub firestore: FirestoreConfig,
    pub fcm: FcmConfig,
    pub auth: AuthConfig,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFIER_ 前缀，如 NOTIFIER_FIRESTORE__PROJECT_ID -> firestore.project_id）
    /// 5. 托管平台注入的变量（PORT、GOOGLE_CLOUD_PROJECT、FIRESTORE_EMULATOR_HOST）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("NOTIFIER_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            // 双下划线分隔层级，单下划线保留给字段名本身（project_id）
            .add_source(
                Environment::with_prefix("NOTIFIER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_platform_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// 应用托管平台注入的环境变量
    ///
    /// 平台变量只填补空缺，不覆盖显式配置的项目 ID；PORT 由平台决定监听端口，始终生效。
    fn apply_platform_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT").filter(|p| !p.is_empty()) {
            if self.firestore.project_id.is_empty() {
                self.firestore.project_id = project.clone();
            }
            if self.fcm.project_id.is_empty() {
                self.fcm.project_id = project;
            }
        }

        if let Some(host) = lookup("FIRESTORE_EMULATOR_HOST").filter(|h| !h.is_empty()) {
            self.firestore.emulator_host = Some(host);
        }
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
