//! Event decoding and dispatch
//!
//! Events of a batch are handled one after another in the order received.
//! A failing event never stops the rest of the batch from being attempted;
//! every result is kept in the [`BatchReport`].

use tracing::{debug, error, info, warn};

use crate::composer::{Composer, Reaction};
use crate::error::{BotError, BotResult};
use crate::line_api::LineApiClient;
use crate::types::{InboundEvent, Message, Postback, ReplyMessage, WebhookBody};

/// Decode a webhook body into its events
///
/// Only the envelope is validated here; `message` and `postback` payloads
/// are decoded by the handler of each event.
pub fn decode_events(body: &[u8]) -> BotResult<Vec<InboundEvent>> {
    let body: WebhookBody =
        serde_json::from_slice(body).map_err(|e| BotError::decode("webhook body", e))?;
    if let Some(destination) = &body.destination {
        debug!("Decoded {} event(s) for {}", body.events.len(), destination);
    }
    Ok(body.events)
}

/// Result of successfully handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// One reply call carrying this many messages
    Replied { messages: usize },
    /// Left the group or room
    Left,
    /// Nothing to answer (unfollow, leave)
    Logged,
    /// Input the bot has no answer for
    Unhandled(String),
}

/// Per-event results of one webhook batch, in event order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<BotResult<DispatchOutcome>>,
}

impl BatchReport {
    /// First error in event order; this decides the HTTP response
    pub fn first_error(&self) -> Option<&BotError> {
        self.results.iter().find_map(|r| r.as_ref().err())
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Routes events to their handlers
pub struct Dispatcher {
    api: LineApiClient,
    composer: Composer,
}

impl Dispatcher {
    pub fn new(api: LineApiClient, composer: Composer) -> Self {
        Self { api, composer }
    }

    /// Dispatch every event in order and collect the results
    pub async fn dispatch_all(&self, events: &[InboundEvent]) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, event) in events.iter().enumerate() {
            let result = self.dispatch(event).await;
            if let Err(e) = &result {
                error!(
                    "Event {} ({}) from {} {} failed: {}",
                    index,
                    event.event_type,
                    event.source.kind(),
                    event.source.chat_id(),
                    e
                );
            }
            report.results.push(result);
        }
        report
    }

    /// Handle a single event
    pub async fn dispatch(&self, event: &InboundEvent) -> BotResult<DispatchOutcome> {
        debug!(
            "Dispatching {} event (timestamp={}) from {} {}",
            event.event_type,
            event.timestamp,
            event.source.kind(),
            event.source.chat_id()
        );

        match event.event_type.as_str() {
            "message" => self.on_message(event).await,
            "follow" => self.on_follow(event).await,
            "unfollow" => {
                info!("👋 Unfollowed by user {}", event.source.chat_id());
                Ok(DispatchOutcome::Logged)
            }
            "join" => {
                info!("📥 Joined {} {}", event.source.kind(), event.source.chat_id());
                self.reply(event, Composer::join_greeting()).await
            }
            "leave" => {
                info!("📤 Removed from {} {}", event.source.kind(), event.source.chat_id());
                Ok(DispatchOutcome::Logged)
            }
            "postback" => self.on_postback(event).await,
            other => Err(BotError::UnknownEventType(other.to_string())),
        }
    }

    async fn on_message(&self, event: &InboundEvent) -> BotResult<DispatchOutcome> {
        let raw = event
            .message
            .as_ref()
            .ok_or_else(|| BotError::decode("message", missing_field("message")))?;
        let message: Message =
            serde_json::from_str(raw.get()).map_err(|e| BotError::decode("message", e))?;

        let reaction = self.composer.compose(&message).await?;
        self.react(event, reaction).await
    }

    async fn on_postback(&self, event: &InboundEvent) -> BotResult<DispatchOutcome> {
        let raw = event
            .postback
            .as_ref()
            .ok_or_else(|| BotError::decode("postback", missing_field("postback")))?;
        let postback: Postback =
            serde_json::from_str(raw.get()).map_err(|e| BotError::decode("postback", e))?;

        debug!("Postback data: {}", postback.data);
        let reaction = self.composer.compose_postback(&postback.data);
        self.react(event, reaction).await
    }

    async fn on_follow(&self, event: &InboundEvent) -> BotResult<DispatchOutcome> {
        let user_id = event.source.user_id().ok_or_else(|| {
            BotError::InvalidArgument("follow event without a user id".to_string())
        })?;
        // Fail before the profile call rather than after it
        reply_token(event)?;

        let profile = self.api.get_profile(user_id).await?;
        info!("🤝 Followed by {} ({})", profile.display_name, user_id);
        self.reply(event, Composer::follow_greeting(&profile.display_name))
            .await
    }

    async fn react(&self, event: &InboundEvent, reaction: Reaction) -> BotResult<DispatchOutcome> {
        match reaction {
            Reaction::Reply(messages) => self.reply(event, messages).await,
            Reaction::LeaveChat => match event.source.leave_target() {
                Some((kind, id)) => {
                    self.api.leave_group_or_room(kind, id).await?;
                    Ok(DispatchOutcome::Left)
                }
                None => Ok(unhandled(format!(
                    "cannot leave a {} chat",
                    event.source.kind()
                ))),
            },
            Reaction::Unhandled(reason) => Ok(unhandled(reason)),
        }
    }

    async fn reply(&self, event: &InboundEvent, messages: Vec<ReplyMessage>) -> BotResult<DispatchOutcome> {
        let token = reply_token(event)?;
        self.api.send_reply(token, &messages).await?;
        Ok(DispatchOutcome::Replied {
            messages: messages.len(),
        })
    }
}

fn reply_token(event: &InboundEvent) -> BotResult<&str> {
    event
        .reply_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            BotError::InvalidArgument(format!("{} event without a reply token", event.event_type))
        })
}

fn missing_field(field: &'static str) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::missing_field(field)
}

fn unhandled(reason: String) -> DispatchOutcome {
    warn!("Nothing to send: {}", reason);
    DispatchOutcome::Unhandled(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_cache::MemoryMediaStore;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(server: &MockServer) -> Dispatcher {
        let api = LineApiClient::with_http(server.uri(), "token", reqwest::Client::new());
        let composer = Composer::with_seed(
            Arc::new(MemoryMediaStore::new(30)),
            "https://bot.example.com/images",
            1,
        );
        Dispatcher::new(api, composer)
    }

    // RawValue fields only deserialize from text, not from a `Value`
    fn event(value: serde_json::Value) -> InboundEvent {
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn text_event(token: &str, text: &str, source: serde_json::Value) -> InboundEvent {
        event(json!({
            "type": "message",
            "replyToken": token,
            "timestamp": 1,
            "source": source,
            "message": {"id": "1", "type": "text", "text": text}
        }))
    }

    async fn accept_replies(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_decode_events_preserves_order() {
        let events = decode_events(
            br#"{"events":[{"type":"follow"},{"type":"message","message":{"broken":true}},{"type":"leave"}]}"#,
        )
        .unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["follow", "message", "leave"]);
    }

    #[test]
    fn test_decode_events_rejects_bad_envelope() {
        for body in [&b"not json"[..], &br#"{"events": 3}"#[..], &b"{}"[..]] {
            assert!(matches!(
                decode_events(body),
                Err(BotError::Decode { context: "webhook body", .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_text_message_replies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .and(body_partial_json(json!({
                "replyToken": "r1",
                "messages": [{"type": "text", "text": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(&server)
            .dispatch(&text_event("r1", "hello", json!({"type": "user", "userId": "U1"})))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Replied { messages: 1 });
    }

    #[tokio::test]
    async fn test_malformed_message_is_decode_error() {
        let server = MockServer::start().await;
        let bad = event(json!({
            "type": "message",
            "replyToken": "r1",
            "message": {"type": "sticker", "id": "1"}
        }));
        let err = dispatcher(&server).dispatch(&bad).await.unwrap_err();
        assert!(matches!(err, BotError::Decode { context: "message", .. }));
    }

    #[tokio::test]
    async fn test_unknown_event_type() {
        let server = MockServer::start().await;
        let err = dispatcher(&server)
            .dispatch(&event(json!({"type": "beacon", "replyToken": "r"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::UnknownEventType(t) if t == "beacon"));
    }

    #[tokio::test]
    async fn test_follow_greets_by_profile_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile/U7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "displayName": "Sally", "userId": "U7"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .and(body_partial_json(json!({
                "messages": [
                    {"type": "text", "text": "Hi, Sally!!"},
                    {"type": "text", "text": "Thank you for being my friend!"},
                    {"type": "sticker", "packageId": "2", "stickerId": "144"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(&server)
            .dispatch(&event(json!({
                "type": "follow",
                "replyToken": "r2",
                "source": {"type": "user", "userId": "U7"}
            })))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Replied { messages: 3 });
    }

    #[tokio::test]
    async fn test_follow_without_user_id() {
        let server = MockServer::start().await;
        let err = dispatcher(&server)
            .dispatch(&event(json!({
                "type": "follow",
                "replyToken": "r",
                "source": {"type": "room", "roomId": "R1"}
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_follow_profile_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile/U8"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = dispatcher(&server)
            .dispatch(&event(json!({
                "type": "follow",
                "replyToken": "r",
                "source": {"type": "user", "userId": "U8"}
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_join_greets_group() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .and(body_partial_json(json!({"replyToken": "r3"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(&server)
            .dispatch(&event(json!({
                "type": "join",
                "replyToken": "r3",
                "source": {"type": "group", "groupId": "C1"}
            })))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Replied { messages: 3 });
    }

    #[tokio::test]
    async fn test_unfollow_and_leave_only_log() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let d = dispatcher(&server);
        for kind in ["unfollow", "leave"] {
            let outcome = d.dispatch(&event(json!({"type": kind}))).await.unwrap();
            assert_eq!(outcome, DispatchOutcome::Logged);
        }
    }

    #[tokio::test]
    async fn test_goodbye_leaves_room() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/room/R5/leave"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = dispatcher(&server)
            .dispatch(&text_event(
                "r",
                "Goodbye everyone",
                json!({"type": "room", "roomId": "R5"}),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Left);
    }

    #[tokio::test]
    async fn test_goodbye_in_user_chat_is_unhandled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = dispatcher(&server)
            .dispatch(&text_event("r", "goodbye", json!({"type": "user", "userId": "U1"})))
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Unhandled(_)));
    }

    #[tokio::test]
    async fn test_postbacks() {
        let server = MockServer::start().await;
        accept_replies(&server).await;
        let d = dispatcher(&server);

        let run = d
            .dispatch(&event(json!({
                "type": "postback", "replyToken": "r", "postback": {"data": "run"}
            })))
            .await
            .unwrap();
        assert_eq!(run, DispatchOutcome::Replied { messages: 2 });

        let unknown = d
            .dispatch(&event(json!({
                "type": "postback", "replyToken": "r", "postback": {"data": "dance"}
            })))
            .await
            .unwrap();
        assert!(matches!(unknown, DispatchOutcome::Unhandled(_)));

        let malformed = d
            .dispatch(&event(json!({
                "type": "postback", "replyToken": "r", "postback": {"nodata": 1}
            })))
            .await
            .unwrap_err();
        assert!(matches!(malformed, BotError::Decode { context: "postback", .. }));
    }

    #[tokio::test]
    async fn test_missing_reply_token() {
        let server = MockServer::start().await;
        let err = dispatcher(&server)
            .dispatch(&event(json!({
                "type": "message",
                "message": {"id": "1", "type": "text", "text": "hi"}
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_payloads_are_decode_errors() {
        let server = MockServer::start().await;
        let d = dispatcher(&server);

        let err = d
            .dispatch(&event(json!({"type": "message", "replyToken": "r"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Decode { context: "message", .. }));

        let err = d
            .dispatch(&event(json!({"type": "postback", "replyToken": "r"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Decode { context: "postback", .. }));
    }

    #[tokio::test]
    async fn test_source_without_chat_id_does_not_sink_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .and(body_partial_json(json!({"replyToken": "r-text"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let events = decode_events(
            br#"{"events":[
                {"type":"message","replyToken":"r-bye","source":{"type":"group"},
                 "message":{"id":"1","type":"text","text":"goodbye"}},
                {"type":"message","replyToken":"r-text","source":{"type":"user","userId":"U1"},
                 "message":{"id":"2","type":"text","text":"still here"}}
            ]}"#,
        )
        .unwrap();
        let report = dispatcher(&server).dispatch_all(&events).await;

        assert!(matches!(
            report.results[0],
            Ok(DispatchOutcome::Unhandled(_))
        ));
        assert!(matches!(
            report.results[1],
            Ok(DispatchOutcome::Replied { messages: 1 })
        ));
    }

    #[tokio::test]
    async fn test_batch_keeps_going_and_reports_first_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let events = vec![
            event(json!({"type": "beacon"})),
            event(json!({"type": "message", "replyToken": "r", "message": "oops"})),
            text_event("r2", "hi", json!({"type": "user", "userId": "U1"})),
        ];
        let report = dispatcher(&server).dispatch_all(&events).await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.error_count(), 2);
        assert!(matches!(
            report.first_error(),
            Some(BotError::UnknownEventType(_))
        ));
        assert!(matches!(
            report.results[2],
            Ok(DispatchOutcome::Replied { messages: 1 })
        ));
    }

    #[tokio::test]
    async fn test_reply_api_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/reply"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid reply token"))
            .mount(&server)
            .await;

        let err = dispatcher(&server)
            .dispatch(&text_event("bad", "hi", json!({"type": "user", "userId": "U1"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid reply token"));
    }
}
