//! Relay Round-Trip Tests
//!
//! Drives `TokenRelay` end to end through an in-memory transport that records
//! every send and can be told to hang on sends to the analyzer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use crate::relay::{
    ChatTransport, ConversationId, InboundMessage, PeerRef, PendingRequests, RelayError,
    RelaySettings, ReplyOutcome, ReplyPolicy, RequestOutcome, Token, TokenExtractor, TokenRelay,
    TransportError,
};

const T1: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";
const T2: &str = "zyxwvutsrqponmlkjihgfedcba987654";

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(PeerRef, String)>>,
    hang_analyzer: AtomicBool,
}

impl RecordingTransport {
    fn hanging() -> Self {
        let t = Self::default();
        t.hang_analyzer.store(true, Ordering::SeqCst);
        t
    }

    fn sent(&self) -> Vec<(PeerRef, String)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, target: &PeerRef, text: &str) -> Result<(), TransportError> {
        if self.hang_analyzer.load(Ordering::SeqCst) && *target == analyzer() {
            std::future::pending::<()>().await;
        }
        self.sent
            .lock()
            .expect("lock")
            .push((target.clone(), text.to_string()));
        Ok(())
    }
}

fn analyzer() -> PeerRef {
    PeerRef::Username("analyzer".to_string())
}

fn settings(policy: ReplyPolicy) -> RelaySettings {
    RelaySettings {
        analyzer: analyzer(),
        command_template: "/analyze {token}".to_string(),
        forward_timeout: Duration::from_millis(50),
        reply_policy: policy,
        rollback_on_timeout: false,
        analyzer_sender: None,
        analyzer_thread: None,
    }
}

fn relay(
    transport: Arc<RecordingTransport>,
    settings: RelaySettings,
) -> TokenRelay<RecordingTransport> {
    TokenRelay::new(
        transport,
        TokenExtractor::default(),
        settings,
        PendingRequests::unbounded(),
    )
}

fn requester_msg(chat: i64, text: &str) -> InboundMessage {
    InboundMessage::new(ConversationId(chat), text)
}

fn analyzer_msg(text: &str) -> InboundMessage {
    InboundMessage::new(ConversationId(900), text).with_username("analyzer")
}

#[tokio::test]
async fn test_strict_round_trip() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    let outcome = assert_ok!(
        relay
            .on_requester_message(&requester_msg(100, &format!("req {T1}")))
            .await
    );
    assert!(matches!(outcome, RequestOutcome::Forwarded { .. }));
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(100))]);

    let reply = format!("resp {T1}");
    let outcome = assert_ok!(relay.on_analyzer_message(&analyzer_msg(&reply)).await);
    assert_eq!(
        outcome,
        ReplyOutcome::Relayed {
            token: Some(Token::new(T1)),
            conversation: ConversationId(100),
        }
    );

    assert_eq!(
        transport.sent(),
        vec![
            (analyzer(), format!("/analyze {T1}")),
            (PeerRef::Id(ConversationId(100)), reply),
        ]
    );
    assert_eq!(relay.pending_len().await, 0);
}

#[tokio::test]
async fn test_strict_unknown_token_is_a_no_op() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);
    let outcome = assert_ok!(
        relay
            .on_analyzer_message(&analyzer_msg(&format!("resp {T2}")))
            .await
    );

    assert_eq!(outcome, ReplyOutcome::UnknownToken(Token::new(T2)));
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(100))]);
}

#[tokio::test]
async fn test_strict_reply_without_token() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);
    let outcome = assert_ok!(
        relay
            .on_analyzer_message(&analyzer_msg("analysis done").mentioning())
            .await
    );

    assert_eq!(outcome, ReplyOutcome::NoToken);
    assert_eq!(relay.pending_len().await, 1);
}

#[tokio::test]
async fn test_concurrent_tokens_route_to_their_own_requesters() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);
    assert_ok!(relay.on_requester_message(&requester_msg(200, T2)).await);

    assert_ok!(relay.on_analyzer_message(&analyzer_msg(&format!("{T1} ok"))).await);
    assert_ok!(relay.on_analyzer_message(&analyzer_msg(&format!("{T2} ok"))).await);

    let replies: Vec<_> = transport
        .sent()
        .into_iter()
        .filter(|(target, _)| *target != analyzer())
        .collect();
    assert_eq!(
        replies,
        vec![
            (PeerRef::Id(ConversationId(100)), format!("{T1} ok")),
            (PeerRef::Id(ConversationId(200)), format!("{T2} ok")),
        ]
    );
    assert_eq!(relay.pending_len().await, 0);
}

#[tokio::test]
async fn test_loose_forwards_to_most_recent_without_mutation() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Loose));

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);
    assert_ok!(relay.on_requester_message(&requester_msg(200, T2)).await);
    let before = relay.snapshot().await;

    let outcome = assert_ok!(
        relay
            .on_analyzer_message(&analyzer_msg("looks fine to me").mentioning())
            .await
    );

    assert_eq!(
        outcome,
        ReplyOutcome::Relayed {
            token: None,
            conversation: ConversationId(200),
        }
    );
    assert_eq!(
        transport.sent().last(),
        Some(&(PeerRef::Id(ConversationId(200)), "looks fine to me".to_string()))
    );
    assert_eq!(relay.snapshot().await, before);
}

#[tokio::test]
async fn test_loose_accepts_replies_too() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Loose));

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);
    let outcome = assert_ok!(
        relay
            .on_analyzer_message(&analyzer_msg(&format!("about {T2}")).replying())
            .await
    );

    // Token in the reply is not checked
    assert_eq!(
        outcome,
        ReplyOutcome::Relayed {
            token: None,
            conversation: ConversationId(100),
        }
    );
    assert_eq!(relay.pending_len().await, 1);
}

#[tokio::test]
async fn test_timeout_leaves_mapping_in_place() {
    let transport = Arc::new(RecordingTransport::hanging());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    let err = assert_err!(relay.on_requester_message(&requester_msg(100, T1)).await);

    assert!(matches!(
        &err,
        RelayError::ForwardTimedOut { token, timeout }
            if *token == Token::new(T1) && *timeout == Duration::from_millis(50)
    ));
    assert!(transport.sent().is_empty());
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(100))]);
}

#[tokio::test]
async fn test_timeout_rolls_back_when_enabled() {
    let transport = Arc::new(RecordingTransport::hanging());
    let mut settings = settings(ReplyPolicy::Strict);
    settings.rollback_on_timeout = true;
    let relay = relay(transport, settings);

    assert_err!(relay.on_requester_message(&requester_msg(100, T1)).await);
    assert_eq!(relay.pending_len().await, 0);
}

#[tokio::test]
async fn test_rollback_keeps_newer_overwrite() {
    let transport = Arc::new(RecordingTransport::hanging());
    let mut settings = settings(ReplyPolicy::Strict);
    settings.rollback_on_timeout = true;
    let relay = Arc::new(relay(transport.clone(), settings));

    let first = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.on_requester_message(&requester_msg(100, T1)).await })
    };
    // Let the first call insert and start waiting on its send
    tokio::time::sleep(Duration::from_millis(10)).await;
    transport.hang_analyzer.store(false, Ordering::SeqCst);
    assert_ok!(relay.on_requester_message(&requester_msg(200, T1)).await);

    let first = first.await.expect("join");
    assert!(first.is_err());
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(200))]);
}

#[tokio::test]
async fn test_reprocessing_same_message_is_idempotent() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));
    let msg = requester_msg(100, &format!("req {T1}"));

    assert_ok!(relay.on_requester_message(&msg).await);
    assert_ok!(relay.on_requester_message(&msg).await);

    assert_eq!(transport.sent().len(), 2);
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(100))]);
}

#[tokio::test]
async fn test_only_first_token_is_used() {
    let transport = Arc::new(RecordingTransport::default());
    let relay = relay(transport.clone(), settings(ReplyPolicy::Strict));

    assert_ok!(
        relay
            .on_requester_message(&requester_msg(100, &format!("{T1} and {T2}")))
            .await
    );

    assert_eq!(transport.sent(), vec![(analyzer(), format!("/analyze {T1}"))]);
    assert_eq!(relay.snapshot().await, vec![(Token::new(T1), ConversationId(100))]);
}

#[tokio::test]
async fn test_group_analyzer_chat_only_trusts_analyzer_account() {
    let transport = Arc::new(RecordingTransport::default());
    let mut settings = settings(ReplyPolicy::Strict);
    settings.analyzer_sender = Some(PeerRef::Username("lismanuga".to_string()));
    let relay = relay(transport.clone(), settings);

    assert_ok!(relay.on_requester_message(&requester_msg(100, T1)).await);

    // A group member quoting the token must not consume the request
    let quote = analyzer_msg(&format!("what is {T1}?")).sent_by(12, Some("curious"));
    let outcome = assert_ok!(relay.on_analyzer_message(&quote).await);
    assert_eq!(outcome, ReplyOutcome::ForeignSender);
    assert_eq!(relay.pending_len().await, 1);

    let answer = analyzer_msg(&format!("{T1}: safe")).sent_by(31, Some("Lismanuga"));
    let outcome = assert_ok!(relay.on_analyzer_message(&answer).await);
    assert_eq!(
        outcome,
        ReplyOutcome::Relayed {
            token: Some(Token::new(T1)),
            conversation: ConversationId(100),
        }
    );
    assert_eq!(
        transport.sent().last(),
        Some(&(PeerRef::Id(ConversationId(100)), format!("{T1}: safe")))
    );
}
