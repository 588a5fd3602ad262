//! 推送发送器
//!
//! 通过 `PushMessenger` trait 抽象多播发送，生产实现委托给 FCM 客户端。

use async_trait::async_trait;
use notifier_shared::error::Result;
use notifier_shared::fcm::{BatchResponse, FcmClient, PushNotification};
use tracing::info;

use crate::models::{NotificationPayload, TokenSet};

/// 多播推送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushMessenger: Send + Sync {
    /// 向全部令牌发送同一条通知，返回按令牌统计的投递结果
    async fn send_multicast(
        &self,
        tokens: &TokenSet,
        payload: &NotificationPayload,
    ) -> Result<BatchResponse>;
}

/// FCM 推送发送器
pub struct FcmMessenger {
    client: FcmClient,
}

impl FcmMessenger {
    pub fn new(client: FcmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushMessenger for FcmMessenger {
    async fn send_multicast(
        &self,
        tokens: &TokenSet,
        payload: &NotificationPayload,
    ) -> Result<BatchResponse> {
        let notification = PushNotification {
            title: payload.title.clone(),
            body: payload.body.clone(),
        };

        info!(
            channel = "FCM",
            token_count = tokens.len(),
            title = %payload.title,
            "发送多播推送"
        );

        self.client
            .send_multicast(tokens.as_slice(), &notification, &payload.data)
            .await
    }
}
