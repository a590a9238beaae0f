use std::sync::Arc;

use crate::{settings::ClientSettings, test_support::*, transport::CopilotBackend};

use super::*;

fn client_with(
    settings: ClientSettings,
) -> (Arc<CopilotClient>, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::default());
    let client = CopilotClient::with_backend(settings, backend.clone() as Arc<dyn CopilotBackend>);
    (client, backend)
}

fn default_client() -> (Arc<CopilotClient>, Arc<ScriptedBackend>) {
    client_with(ClientSettings::default())
}

#[test]
fn rejected_turns_leave_state_untouched() {
    let mut state = CopilotState::new(4);
    state.chat_input = "   \t ".to_string();
    assert_eq!(
        begin_turn(&mut state, TopKPolicy::Clamp).expect_err("blank"),
        SubmitRejection::Blank
    );
    assert!(state.conversation.is_empty());
    assert_eq!(state.phase, ChatPhase::Idle);

    state.chat_input = "hello".to_string();
    state.phase = ChatPhase::AwaitingAnswer;
    assert_eq!(
        begin_turn(&mut state, TopKPolicy::Clamp).expect_err("busy"),
        SubmitRejection::Busy
    );
    assert_eq!(state.chat_input, "hello");
    assert!(state.conversation.is_empty());
}

#[test]
fn accepted_turn_records_user_message_and_clears_input() {
    let mut state = CopilotState::new(4);
    state.chat_input = "  What is the leave policy? ".to_string();
    state.controls.source_filter = Some(SourceType::File);

    let (request, message) = begin_turn(&mut state, TopKPolicy::Clamp).expect("accepted");

    assert_eq!(message, Message::user("  What is the leave policy? "));
    assert_eq!(request.message, "  What is the leave policy? ");
    assert_eq!(request.source_type, Some(SourceType::File));
    assert_eq!(request.top_k, 4);
    assert!(!request.enable_mcp);
    assert!(state.chat_input.is_empty());
    assert_eq!(state.phase, ChatPhase::AwaitingAnswer);
    assert_eq!(state.conversation.messages(), &[message]);
}

#[tokio::test]
async fn user_message_is_visible_before_answer_resolves() {
    let (client, backend) = default_client();
    let (entered, release) = backend.hold_next_chat().await;
    client.set_chat_input("Where is the handbook?").await;

    let turn = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.submit().await }
    });
    entered.await.expect("chat reached backend");

    let awaiting = client.snapshot().await;
    assert_eq!(awaiting.phase, ChatPhase::AwaitingAnswer);
    assert!(awaiting.chat_input.is_empty());
    assert_eq!(awaiting.conversation.len(), 1);
    assert_eq!(
        awaiting.conversation.last(),
        Some(&Message::user("Where is the handbook?"))
    );

    release.send(()).expect("release chat");
    assert_eq!(turn.await.expect("join"), SubmitOutcome::Answered);

    let done = client.snapshot().await;
    assert_eq!(done.phase, ChatPhase::Idle);
    let messages = done.conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], Message::user("Where is the handbook?"));
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Answer for: Where is the handbook?");
}

#[tokio::test]
async fn second_submit_while_awaiting_is_rejected() {
    let (client, backend) = default_client();
    let (entered, release) = backend.hold_next_chat().await;

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send_message("first question").await }
    });
    entered.await.expect("chat reached backend");

    let second = client.send_message("second question").await;
    assert_eq!(second, SubmitOutcome::Rejected(SubmitRejection::Busy));
    assert_eq!(backend.chat_request_count().await, 1);
    let awaiting = client.snapshot().await;
    assert_eq!(awaiting.conversation.len(), 1);
    assert_eq!(awaiting.chat_input, "second question");

    release.send(()).expect("release chat");
    assert_eq!(first.await.expect("join"), SubmitOutcome::Answered);

    let done = client.snapshot().await;
    assert_eq!(done.conversation.len(), 2);
    assert_eq!(backend.chat_request_count().await, 1);
}

#[tokio::test]
async fn whitespace_only_input_is_ignored() {
    let (client, backend) = default_client();
    let mut events = client.subscribe_events();

    for input in ["", "   ", "\n\t "] {
        assert_eq!(
            client.send_message(input).await,
            SubmitOutcome::Rejected(SubmitRejection::Blank)
        );
    }

    let state = client.snapshot().await;
    assert!(state.conversation.is_empty());
    assert_eq!(state.phase, ChatPhase::Idle);
    assert_eq!(backend.chat_request_count().await, 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn answer_keeps_citations_in_backend_order() {
    let (client, backend) = default_client();
    let s1 = citation("handbook.pdf", SourceType::File, "policy content");
    let s2 = citation("https://docs", SourceType::Url, "faq content");
    backend
        .push_chat_reply(Ok(ChatResponse {
            answer: "A".to_string(),
            sources: vec![s1.clone(), s2.clone()],
        }))
        .await;

    assert_eq!(client.send_message("Q").await, SubmitOutcome::Answered);

    let state = client.snapshot().await;
    let answer = state.conversation.last().expect("assistant message");
    assert_eq!(answer.role, Role::Assistant);
    assert_eq!(answer.content, "A");
    assert_eq!(answer.sources, Some(vec![s1, s2]));
}

#[tokio::test]
async fn consecutive_failures_each_append_one_notice() {
    let (client, backend) = default_client();
    for _ in 0..3 {
        backend.push_chat_reply(Err(server_error())).await;
    }

    for attempt in 0..3 {
        assert_eq!(
            client.send_message(format!("attempt {attempt}")).await,
            SubmitOutcome::Failed
        );
        let state = client.snapshot().await;
        assert_eq!(state.phase, ChatPhase::Idle);
        assert_eq!(state.conversation.len(), (attempt + 1) * 2);
        assert_eq!(state.conversation.last(), Some(&Message::request_failed()));
    }

    let state = client.snapshot().await;
    let notices = state
        .conversation
        .iter()
        .filter(|message| message.content == REQUEST_FAILED_NOTICE)
        .count();
    assert_eq!(notices, 3);
    assert!(state
        .conversation
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .all(|message| message.sources.is_none()));
}

#[tokio::test]
async fn request_uses_controls_captured_at_submit() {
    let (client, backend) = default_client();
    client.set_source_filter(Some(SourceType::Url)).await;
    client.set_top_k(3).await;
    client.set_enable_mcp(true).await;

    let (entered, release) = backend.hold_next_chat().await;
    let turn = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send_message("first").await }
    });
    entered.await.expect("chat reached backend");

    client.set_source_filter(None).await;
    client.set_top_k(8).await;
    client.set_enable_mcp(false).await;
    client.set_chat_input("typed while waiting").await;

    release.send(()).expect("release chat");
    assert_eq!(turn.await.expect("join"), SubmitOutcome::Answered);
    assert_eq!(client.snapshot().await.chat_input, "typed while waiting");

    assert_eq!(client.submit().await, SubmitOutcome::Answered);

    let requests = backend.chat_requests.lock().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].source_type, Some(SourceType::Url));
    assert_eq!(requests[0].top_k, 3);
    assert!(requests[0].enable_mcp);
    assert_eq!(requests[1].message, "typed while waiting");
    assert_eq!(requests[1].source_type, None);
    assert_eq!(requests[1].top_k, 8);
    assert!(!requests[1].enable_mcp);
}

#[tokio::test]
async fn out_of_range_top_k_is_clamped_before_sending() {
    let (client, backend) = default_client();
    client.set_top_k(12).await;
    assert_eq!(client.send_message("deep search").await, SubmitOutcome::Answered);

    client.set_top_k(0).await;
    assert_eq!(client.send_message("shallow search").await, SubmitOutcome::Answered);

    let requests = backend.chat_requests.lock().await;
    assert_eq!(requests[0].top_k, 10);
    assert_eq!(requests[1].top_k, 1);
}

#[tokio::test]
async fn reject_policy_blocks_out_of_range_top_k() {
    let (client, backend) = client_with(ClientSettings {
        top_k_policy: TopKPolicy::Reject,
        ..ClientSettings::default()
    });
    client.set_top_k(12).await;

    assert_eq!(
        client.send_message("deep search").await,
        SubmitOutcome::Rejected(SubmitRejection::TopKOutOfRange(12))
    );
    let state = client.snapshot().await;
    assert!(state.conversation.is_empty());
    assert_eq!(state.phase, ChatPhase::Idle);
    assert_eq!(state.chat_input, "deep search");
    assert_eq!(backend.chat_request_count().await, 0);
}

#[tokio::test]
async fn pass_through_policy_sends_value_unchanged() {
    let (client, backend) = client_with(ClientSettings {
        top_k_policy: TopKPolicy::PassThrough,
        ..ClientSettings::default()
    });
    client.set_top_k(12).await;

    assert_eq!(client.send_message("deep search").await, SubmitOutcome::Answered);
    assert_eq!(backend.chat_requests.lock().await[0].top_k, 12);
}

#[tokio::test]
async fn turn_events_follow_state_transitions() {
    let (client, _backend) = default_client();
    let mut events = client.subscribe_events();

    assert_eq!(client.send_message("hi").await, SubmitOutcome::Answered);

    match events.recv().await.expect("event") {
        ClientEvent::MessageAppended(message) => assert_eq!(message, Message::user("hi")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events.recv().await.expect("event"),
        ClientEvent::PhaseChanged(ChatPhase::AwaitingAnswer)
    ));
    match events.recv().await.expect("event") {
        ClientEvent::MessageAppended(message) => {
            assert_eq!(message.role, Role::Assistant);
            assert_eq!(message.content, "Answer for: hi");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events.recv().await.expect("event"),
        ClientEvent::PhaseChanged(ChatPhase::Idle)
    ));
}
