//! 订单通知服务
//!
//! 接收 orders 集合的文档创建事件，查询全部员工用户的设备令牌，
//! 通过一次多播向员工推送新订单通知。

pub mod error;
pub mod event;
pub mod handler;
pub mod messenger;
pub mod models;
pub mod server;
pub mod store;
