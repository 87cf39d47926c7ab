pub mod dispatch;
pub mod models;
pub mod publish;
pub mod replay;
pub mod stats;
pub mod subscriptions;
pub mod topics;
pub mod validation;

pub use dispatch::{acquire_due_delivery, mark_dlq, mark_retry, mark_succeeded};
pub use models::{
    DeliveryStatus, DispatchableDelivery, EventDelivery, EventMessage, EventSubscriptionRow,
    EventTopic, PublishResult, SubscriptionStats, SubscriptionTarget, WebhookConfig,
};
pub use publish::{publish, publish_from_outbox, NewMessage};
pub use replay::{replay, resolve_by_time};
pub use stats::subscription_stats;
pub use subscriptions::{
    create_subscription, delete_subscription, get_subscription, list_subscriptions_for_topic,
    set_enabled, NewSubscription,
};
pub use topics::{create_topic, delete_topic, get_topic, get_topic_by_name, list_topics};
