//! 新订单通知处理器
//!
//! 单次调用是一条线性流程：查询员工 -> 收集令牌 -> 构造通知 -> 多播发送。
//! 唯一的分支是令牌为空时提前结束。查询与发送的错误直接上抛，不做重试，
//! 多播中个别令牌失败只记录在返回结果里。

use std::sync::Arc;
use std::time::Instant;

use notifier_shared::fcm::BatchResponse;
use notifier_shared::observability::metrics;
use tracing::{debug, info, instrument};

use crate::error::OrderNotifierError;
use crate::event::OrderCreatedEvent;
use crate::messenger::PushMessenger;
use crate::models::{NotificationPayload, TokenSet, User};
use crate::store::UserStore;

/// 单次调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 没有任何员工登记了设备令牌，未发送
    NoRecipients,
    /// 已发送，附带按令牌统计的投递结果
    Dispatched(BatchResponse),
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoRecipients => "no_recipients",
            Self::Dispatched(_) => "dispatched",
        }
    }
}

/// 新订单通知处理器
///
/// 持有的存储和发送器在进程启动时构建一次，并发调用之间不共享可变状态。
pub struct OrderNotifier {
    users: Arc<dyn UserStore>,
    messenger: Arc<dyn PushMessenger>,
    employee_role: String,
}

impl OrderNotifier {
    pub fn new(
        users: Arc<dyn UserStore>,
        messenger: Arc<dyn PushMessenger>,
        employee_role: impl Into<String>,
    ) -> Self {
        Self {
            users,
            messenger,
            employee_role: employee_role.into(),
        }
    }

    /// 处理一条订单创建事件
    #[instrument(skip_all, fields(
        event_id = ?event.event_id,
        document = %event.document_name,
        order_id = ?event.order.order_id,
    ))]
    pub async fn handle(
        &self,
        event: &OrderCreatedEvent,
    ) -> Result<DispatchOutcome, OrderNotifierError> {
        let start = Instant::now();
        let result = self.dispatch(event).await;

        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        metrics::record_order_event(outcome, start.elapsed().as_secs_f64());

        result
    }

    async fn dispatch(
        &self,
        event: &OrderCreatedEvent,
    ) -> Result<DispatchOutcome, OrderNotifierError> {
        info!(event_time = ?event.event_time, "收到新订单事件");

        let employees = self
            .users
            .find_users_by_role(&self.employee_role)
            .await
            .map_err(OrderNotifierError::UserQuery)?;

        let tokens = collect_tokens(&employees, &self.employee_role);
        debug!(
            users = employees.len(),
            tokens = tokens.len(),
            "员工令牌收集完成"
        );

        if tokens.is_empty() {
            info!("No employee FCM tokens found");
            return Ok(DispatchOutcome::NoRecipients);
        }

        let payload = NotificationPayload::for_order(&event.order);

        let response = self
            .messenger
            .send_multicast(&tokens, &payload)
            .await
            .map_err(OrderNotifierError::Dispatch)?;

        metrics::record_push_results(response.success_count, response.failure_count);
        info!(
            success_count = response.success_count,
            failure_count = response.failure_count,
            "Notifications sent"
        );
        debug!(response = ?response, "多播响应明细");

        Ok(DispatchOutcome::Dispatched(response))
    }
}

/// 按查询返回顺序收集指定角色用户的设备令牌
///
/// 存储返回的其他角色用户一律跳过；没有令牌的用户静默跳过。
pub fn collect_tokens(users: &[User], role: &str) -> TokenSet {
    users
        .iter()
        .filter(|user| user.has_role(role))
        .filter_map(User::push_token)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::MockPushMessenger;
    use crate::models::Order;
    use crate::store::MockUserStore;
    use mockall::predicate::eq;
    use notifier_shared::error::PlatformError;
    use notifier_shared::fcm::SendResponse;

    fn user(id: &str, role: &str, token: Option<&str>) -> User {
        User {
            id: id.to_string(),
            role: Some(role.to_string()),
            fcm_token: token.map(String::from),
        }
    }

    fn make_event(order_id: &str, customer_id: &str) -> OrderCreatedEvent {
        OrderCreatedEvent {
            event_id: Some("evt-test-001".to_string()),
            event_time: None,
            document_name: "projects/shop/databases/(default)/documents/orders/abc".to_string(),
            order: Order {
                order_id: Some(order_id.to_string()),
                customer_id: Some(customer_id.to_string()),
                ..Default::default()
            },
        }
    }

    /// 按令牌全部成功构造多播结果
    fn all_success(tokens: &TokenSet) -> BatchResponse {
        BatchResponse::from_responses(
            tokens
                .as_slice()
                .iter()
                .map(|t| SendResponse {
                    token: t.clone(),
                    success: true,
                    message_id: Some(format!("projects/shop/messages/{t}")),
                    error: None,
                })
                .collect(),
        )
    }

    fn notifier(store: MockUserStore, messenger: MockPushMessenger) -> OrderNotifier {
        OrderNotifier::new(Arc::new(store), Arc::new(messenger), "employee")
    }

    /// 收集日志输出的写入器
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// 在指定日志级别下运行一次处理，返回处理结果与日志文本
    async fn handle_with_logs(
        notifier: OrderNotifier,
        event: OrderCreatedEvent,
        level: tracing::Level,
    ) -> (Result<DispatchOutcome, OrderNotifierError>, String) {
        use tracing::instrument::WithSubscriber;

        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let result = async move { notifier.handle(&event).await }
            .with_subscriber(subscriber)
            .await;
        (result, buffer.contents())
    }

    #[tokio::test]
    async fn test_sends_only_truthy_employee_tokens() {
        let mut store = MockUserStore::new();
        store
            .expect_find_users_by_role()
            .with(eq("employee"))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    user("u1", "employee", Some("t1")),
                    user("u2", "employee", Some("")),
                    user("u3", "customer", Some("t9")),
                ])
            });

        let mut messenger = MockPushMessenger::new();
        messenger
            .expect_send_multicast()
            .withf(|tokens, payload| {
                tokens.as_slice() == ["t1"]
                    && payload.title == "New Order Received"
                    && payload.body == "A new order has been created: o1"
                    && payload.data.get("orderId").map(String::as_str) == Some("o1")
                    && payload.data.get("customerId").map(String::as_str) == Some("c1")
                    && payload.data.len() == 2
            })
            .times(1)
            .returning(|tokens, _| Ok(all_success(tokens)));

        let outcome = notifier(store, messenger)
            .handle(&make_event("o1", "c1"))
            .await
            .unwrap();

        let DispatchOutcome::Dispatched(response) = outcome else {
            panic!("应已发送通知");
        };
        assert_eq!(response.success_count, 1);
        assert_eq!(response.failure_count, 0);
    }

    #[tokio::test]
    async fn test_no_employees_skips_send() {
        let mut store = MockUserStore::new();
        store
            .expect_find_users_by_role()
            .times(1)
            .returning(|_| Ok(vec![]));

        let mut messenger = MockPushMessenger::new();
        messenger.expect_send_multicast().never();

        let (result, logs) = handle_with_logs(
            notifier(store, messenger),
            make_event("o1", "c1"),
            tracing::Level::INFO,
        )
        .await;

        assert_eq!(result.unwrap(), DispatchOutcome::NoRecipients);
        assert!(logs.contains("No employee FCM tokens found"), "logs: {logs}");
        assert!(!logs.contains("Notifications sent"));
    }

    #[tokio::test]
    async fn test_sent_log_keeps_response_detail_at_debug() {
        let make_notifier = || {
            let mut store = MockUserStore::new();
            store
                .expect_find_users_by_role()
                .returning(|_| Ok(vec![user("u1", "employee", Some("t1"))]));
            let mut messenger = MockPushMessenger::new();
            messenger
                .expect_send_multicast()
                .returning(|tokens, _| Ok(all_success(tokens)));
            notifier(store, messenger)
        };

        let (result, info_logs) = handle_with_logs(
            make_notifier(),
            make_event("o1", "c1"),
            tracing::Level::INFO,
        )
        .await;
        assert!(matches!(result, Ok(DispatchOutcome::Dispatched(_))));
        assert!(info_logs.contains("Notifications sent"), "logs: {info_logs}");
        assert!(info_logs.contains("success_count=1"));
        assert!(!info_logs.contains("messages/t1"));

        let (_, debug_logs) = handle_with_logs(
            make_notifier(),
            make_event("o1", "c1"),
            tracing::Level::DEBUG,
        )
        .await;
        assert!(debug_logs.contains("messages/t1"), "logs: {debug_logs}");
    }

    #[tokio::test]
    async fn test_employees_without_tokens_skip_send() {
        let mut store = MockUserStore::new();
        store.expect_find_users_by_role().returning(|_| {
            Ok(vec![
                user("u1", "employee", None),
                user("u2", "employee", Some("")),
            ])
        });

        let mut messenger = MockPushMessenger::new();
        messenger.expect_send_multicast().never();

        let outcome = notifier(store, messenger)
            .handle(&make_event("o1", "c1"))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::NoRecipients);
    }

    #[tokio::test]
    async fn test_tokens_keep_query_order() {
        let mut store = MockUserStore::new();
        store.expect_find_users_by_role().returning(|_| {
            Ok(vec![
                user("u5", "employee", Some("t5")),
                user("u1", "employee", None),
                user("u3", "employee", Some("t3")),
                user("u4", "employee", Some("t4")),
            ])
        });

        let mut messenger = MockPushMessenger::new();
        messenger
            .expect_send_multicast()
            .withf(|tokens, _| tokens.as_slice() == ["t5", "t3", "t4"])
            .times(1)
            .returning(|tokens, _| Ok(all_success(tokens)));

        let outcome = notifier(store, messenger)
            .handle(&make_event("o2", "c2"))
            .await;
        tokio_test::assert_ok!(outcome);
    }

    #[tokio::test]
    async fn test_query_failure_propagates_without_send() {
        let mut store = MockUserStore::new();
        store.expect_find_users_by_role().returning(|_| {
            Err(PlatformError::Firestore {
                status: 503,
                message: "UNAVAILABLE".to_string(),
            })
        });

        let mut messenger = MockPushMessenger::new();
        messenger.expect_send_multicast().never();

        let err = notifier(store, messenger)
            .handle(&make_event("o1", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderNotifierError::UserQuery(_)));
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let mut store = MockUserStore::new();
        store
            .expect_find_users_by_role()
            .returning(|_| Ok(vec![user("u1", "employee", Some("t1"))]));

        let mut messenger = MockPushMessenger::new();
        messenger
            .expect_send_multicast()
            .times(1)
            .returning(|_, _| Err(PlatformError::Auth("metadata unreachable".to_string())));

        let err = notifier(store, messenger)
            .handle(&make_event("o1", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderNotifierError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_not_raised() {
        let mut store = MockUserStore::new();
        store.expect_find_users_by_role().returning(|_| {
            Ok(vec![
                user("u1", "employee", Some("t1")),
                user("u2", "employee", Some("stale")),
            ])
        });

        let mut messenger = MockPushMessenger::new();
        messenger.expect_send_multicast().returning(|_, _| {
            Ok(BatchResponse::from_responses(vec![
                SendResponse {
                    token: "t1".to_string(),
                    success: true,
                    message_id: Some("projects/shop/messages/1".to_string()),
                    error: None,
                },
                SendResponse {
                    token: "stale".to_string(),
                    success: false,
                    message_id: None,
                    error: Some("NOT_FOUND".to_string()),
                },
            ]))
        });

        let outcome = notifier(store, messenger)
            .handle(&make_event("o1", "c1"))
            .await
            .unwrap();

        let DispatchOutcome::Dispatched(response) = outcome else {
            panic!("应已发送通知");
        };
        assert_eq!(response.success_count, 1);
        assert_eq!(response.failure_count, 1);
    }

    #[test]
    fn test_collect_tokens_counts() {
        // N 个员工中 K 个有非空令牌，恰好收集 K 个
        let users = vec![
            user("u1", "employee", Some("a")),
            user("u2", "employee", None),
            user("u3", "manager", Some("m")),
            user("u4", "employee", Some("b")),
            User {
                id: "u5".to_string(),
                role: None,
                fcm_token: Some("x".to_string()),
            },
        ];
        let tokens = collect_tokens(&users, "employee");
        assert_eq!(tokens.as_slice(), ["a", "b"]);
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(DispatchOutcome::NoRecipients.label(), "no_recipients");
        assert_eq!(
            DispatchOutcome::Dispatched(BatchResponse::default()).label(),
            "dispatched"
        );
    }
}
