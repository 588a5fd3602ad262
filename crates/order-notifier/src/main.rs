//! 订单通知服务
//!
//! 接收 orders 集合的文档创建事件，向全部员工设备推送新订单通知。

use std::sync::Arc;
use std::time::Duration;

use notifier_shared::{
    auth::{self, AccessTokenProvider, NoAuth},
    config::AppConfig,
    fcm::FcmClient,
    firestore::FirestoreClient,
    observability,
};
use order_notifier::{
    handler::OrderNotifier,
    messenger::FcmMessenger,
    server::{self, AppState},
    store::FirestoreUserStore,
};
use tokio::net::TcpListener;
use tracing::info;

const SERVICE_NAME: &str = "order-notifier";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        firestore_project = %config.firestore.project_id,
        emulator = ?config.firestore.emulator_host,
        "Starting order-notifier on {}",
        config.server_addr()
    );

    // 进程级客户端只在启动时构建一次，之后所有调用共享
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_seconds))
        .build()?;

    let token_provider = auth::provider_from_config(&config.auth, http.clone())?;

    // 模拟器不校验令牌
    let firestore_auth: Arc<dyn AccessTokenProvider> = if config.firestore.emulator_host.is_some() {
        Arc::new(NoAuth)
    } else {
        token_provider.clone()
    };

    let firestore = FirestoreClient::from_config(http.clone(), &config.firestore, firestore_auth)?;
    let fcm = FcmClient::new(http, &config.fcm, token_provider)?;

    let notifier = OrderNotifier::new(
        Arc::new(FirestoreUserStore::new(firestore, &config.firestore)),
        Arc::new(FcmMessenger::new(fcm)),
        config.firestore.employee_role.clone(),
    );

    let app = server::router(AppState {
        notifier: Arc::new(notifier),
        orders_collection: config.firestore.orders_collection.clone(),
        service_name: config.service_name.clone(),
    });

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 收到 SIGTERM（平台缩容）或 Ctrl+C 时停止接收新事件，等待处理中的调用完成
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
