//! 共享库
//!
//! 包含订单通知服务使用的配置、错误处理、可观测性，以及 Firestore、FCM、
//! 访问令牌等 Google Cloud 基础设施客户端。

pub mod auth;
pub mod config;
pub mod error;
pub mod fcm;
pub mod firestore;
pub mod observability;
