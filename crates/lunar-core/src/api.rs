//! The API handle given to handlers.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::event::Event;
use crate::segment::Message;

/// Outbound API surface of a connected bot.
///
/// Implementors only provide [`call_api`](BotApi::call_api) and
/// [`push_api`](BotApi::push_api); the typed helpers are built on top.
#[async_trait]
pub trait BotApi: Send + Sync + 'static {
    /// Calls an action and waits for its response data.
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value>;

    /// Sends an action without waiting for a response.
    async fn push_api(&self, action: &str, params: Value) -> ApiResult<()>;

    /// Sends a private message. Returns the new message id.
    async fn send_private_msg(&self, user_id: i64, message: Message) -> ApiResult<i64> {
        let data = self
            .call_api(
                "send_private_msg",
                json!({ "user_id": user_id, "message": message }),
            )
            .await?;
        message_id(&data)
    }

    /// Sends a group message. Returns the new message id.
    async fn send_group_msg(&self, group_id: i64, message: Message) -> ApiResult<i64> {
        let data = self
            .call_api(
                "send_group_msg",
                json!({ "group_id": group_id, "message": message }),
            )
            .await?;
        message_id(&data)
    }

    /// Answers in the conversation the event came from: the group when there
    /// is one, otherwise the user.
    async fn reply(&self, event: &Event, message: Message) -> ApiResult<i64> {
        if let Some(group_id) = event.group_id() {
            self.send_group_msg(group_id, message).await
        } else if let Some(user_id) = event.user_id() {
            self.send_private_msg(user_id, message).await
        } else {
            Err(ApiError::MissingSession)
        }
    }

    /// Recalls a message.
    async fn delete_msg(&self, message_id: i64) -> ApiResult<()> {
        self.call_api("delete_msg", json!({ "message_id": message_id }))
            .await
            .map(|_| ())
    }

    /// Fetches a message by id.
    async fn get_msg(&self, message_id: i64) -> ApiResult<Value> {
        self.call_api("get_msg", json!({ "message_id": message_id }))
            .await
    }
}

fn message_id(data: &Value) -> ApiResult<i64> {
    data.get("message_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Serialization("response carries no message_id".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::EventClassifier;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl BotApi for Recorder {
        async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().unwrap().push((action.to_string(), params));
            Ok(json!({ "message_id": 77 }))
        }

        async fn push_api(&self, _action: &str, _params: Value) -> ApiResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reply_routes_to_group_then_user() {
        let bot = Recorder::default();
        let classifier = EventClassifier::default();

        let group = classifier.classify(json!({
            "post_type": "message", "message_type": "group",
            "group_id": 1, "user_id": 2, "message": "hi"
        }));
        let private = classifier.classify(json!({
            "post_type": "message", "message_type": "private",
            "user_id": 3, "message": "hi"
        }));

        assert_eq!(bot.reply(&group, "a".into()).await.unwrap(), 77);
        assert_eq!(bot.reply(&private, "b".into()).await.unwrap(), 77);

        let calls = bot.calls.lock().unwrap();
        assert_eq!(calls[0].0, "send_group_msg");
        assert_eq!(calls[0].1["group_id"], 1);
        assert_eq!(calls[1].0, "send_private_msg");
        assert_eq!(calls[1].1["user_id"], 3);
        assert_eq!(calls[1].1["message"][0]["data"]["text"], "b");
    }

    #[tokio::test]
    async fn reply_without_session_fails() {
        let bot = Recorder::default();
        let event = crate::classifier::lifecycle(crate::event::LifecycleEvent::StopListening);
        assert!(matches!(
            bot.reply(&event, "x".into()).await,
            Err(ApiError::MissingSession)
        ));
    }
}
