//! 用户存储
//!
//! 通知流程只需按角色读取用户，不修改任何用户记录。

use async_trait::async_trait;
use notifier_shared::config::FirestoreConfig;
use notifier_shared::error::Result;
use notifier_shared::firestore::{FirestoreClient, Value};

use crate::models::User;

/// 用户存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 读取指定角色的全部用户，不分页，不保证顺序
    async fn find_users_by_role(&self, role: &str) -> Result<Vec<User>>;
}

/// 基于 Firestore 的用户存储
pub struct FirestoreUserStore {
    client: FirestoreClient,
    collection: String,
    role_field: String,
    token_field: String,
}

impl FirestoreUserStore {
    pub fn new(client: FirestoreClient, config: &FirestoreConfig) -> Self {
        Self {
            client,
            collection: config.users_collection.clone(),
            role_field: config.role_field.clone(),
            token_field: config.token_field.clone(),
        }
    }
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn find_users_by_role(&self, role: &str) -> Result<Vec<User>> {
        let documents = self
            .client
            .query_equal(&self.collection, &self.role_field, Value::from(role))
            .await?;

        Ok(documents
            .iter()
            .map(|doc| User::from_document(doc, &self.role_field, &self.token_field))
            .collect())
    }
}
