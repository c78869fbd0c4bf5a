mod common;

use std::sync::Arc;
use std::time::Duration;

use chat_client::{
    ChatClient, ChatSubscription, ClientConfig, ClientEvent, ConnectionState, DeliveryState, Draft,
    ScrollAction, Viewport,
};
use coursechat_common::{Attachment, ChatEvent};
use tokio::time::Instant;

use common::{connected, message, settle, ScriptedApi, CHAT};

const ME: &str = "usr_me";

fn client(api: &Arc<ScriptedApi>) -> ChatClient {
    ChatClient::new(api.clone(), ClientConfig::default())
}

async fn wait_connected(sub: &ChatSubscription) {
    let mut state = sub.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(ConnectionState::is_connected),
    )
    .await
    .expect("timed out waiting for connection")
    .expect("controller stopped");
}

// ---------------------------------------------------------------------------
// Staleness and reconnect
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn silent_stream_is_closed_and_reconnected_after_base_delay() {
    let api = ScriptedApi::new(ME);
    let first = api.queue_stream();
    let _second = api.queue_stream();
    let client = client(&api);

    let sub = client.subscribe(CHAT).await.unwrap();
    first.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;
    let t0 = Instant::now();

    tokio::time::sleep_until(t0 + Duration::from_secs(59)).await;
    assert_eq!(api.opens().len(), 1);
    assert!(sub.state().is_connected());

    tokio::time::sleep_until(t0 + Duration::from_millis(60_500)).await;
    assert_eq!(api.opens().len(), 1, "reconnect waits for the base delay");
    assert!(first.is_closed(), "silent stream must be closed before reconnecting");

    tokio::time::sleep_until(t0 + Duration::from_secs(62)).await;
    let opens = api.opens();
    assert_eq!(opens.len(), 2);
    let gap = opens[1] - t0;
    assert!(gap >= Duration::from_secs(61), "reconnected after {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn pings_keep_the_stream_alive() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);

    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(25)).await;
        stream.send(ChatEvent::ping()).unwrap();
    }

    assert_eq!(api.opens().len(), 1);
    assert!(sub.state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn backoff_is_bounded_then_falls_back_to_polling() {
    let api = ScriptedApi::new(ME);
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;

    let opens = api.opens();
    assert_eq!(opens.len(), 11, "one initial open plus ten reconnects");
    let policy = ClientConfig::default().reconnect;
    for (n, pair) in opens.windows(2).enumerate() {
        let attempt = n as u32 + 1;
        assert!(
            pair[1] - pair[0] >= policy.delay(attempt),
            "attempt {attempt} scheduled too early"
        );
    }
    assert_eq!(sub.state(), ConnectionState::Failed);

    // Polling runs every 15s for five minutes, then stops.
    let failed_at = *opens.last().unwrap();
    tokio::time::sleep_until(failed_at + Duration::from_secs(600)).await;
    assert_eq!(api.opens().len(), 11, "no stream reconnects while failed");

    let polls: Vec<Instant> = api
        .fetches()
        .into_iter()
        .map(|(at, _)| at)
        .filter(|at| *at >= failed_at)
        .collect();
    assert!(polls.len() >= 20, "only {} polls", polls.len());
    assert!(polls
        .iter()
        .all(|at| *at <= failed_at + Duration::from_secs(300)));
    assert_eq!(sub.state(), ConnectionState::Failed);

    // A manual reconnect starts over.
    let stream = api.queue_stream();
    sub.reconnect().unwrap();
    settle(Duration::from_secs(1), || api.opens().len() == 12).await;
    stream.send(connected("sc_2")).unwrap();
    wait_connected(&sub).await;
}

#[tokio::test(start_paused = true)]
async fn successful_frames_reset_the_attempt_counter() {
    let api = ScriptedApi::new(ME);
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();

    // First open fails, attempt 1 succeeds a second later.
    settle(Duration::from_secs(1), || api.opens().len() == 1).await;
    let stream = api.queue_stream();
    settle(Duration::from_secs(5), || api.opens().len() == 2).await;
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    // Server drops the stream; the next attempt starts from the base delay.
    let _next = api.queue_stream();
    let dropped_at = Instant::now();
    drop(stream);
    settle(Duration::from_secs(5), || api.opens().len() == 3).await;
    let gap = api.opens()[2] - dropped_at;
    assert!(gap >= Duration::from_secs(1) && gap < Duration::from_secs(2), "gap {gap:?}");
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn quiet_connection_refetches_latest_page() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;
    assert_eq!(api.fetches().len(), 1, "initial load only");

    // A message the stream never delivered.
    api.seed_history(vec![message("msg_lost", "usr_b", "dropped on the floor")]);

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        stream.send(ChatEvent::ping()).unwrap();
    }

    assert!(api.fetches().len() >= 2);
    let ids: Vec<String> = sub.messages().into_iter().map(|m| m.message.id).collect();
    assert_eq!(ids, vec!["msg_lost".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn busy_connection_skips_refetch() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    for i in 0..5 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        stream
            .send(ChatEvent::NewMessage {
                message: message(&format!("msg_{i}"), "usr_b", "chatter"),
            })
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(api.fetches().len(), 1);
    assert_eq!(sub.messages().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn reconnect_catches_up_on_messages_missed_while_down() {
    let api = ScriptedApi::new(ME);
    let first = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    first.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    // Persisted while the stream is down, so no push ever carries it.
    let second = api.queue_stream();
    drop(first);
    api.seed_history(vec![message("msg_gap", "usr_b", "sent during the outage")]);
    settle(Duration::from_secs(5), || api.opens().len() == 2).await;
    second.send(connected("sc_2")).unwrap();
    wait_connected(&sub).await;

    // Keep the chat busy so the quiet-window refetch never fires.
    for i in 0..3 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        second
            .send(ChatEvent::NewMessage {
                message: message(&format!("msg_live_{i}"), "usr_b", "chatter"),
            })
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(api.fetches().len(), 2, "initial load plus one catch-up");
    let ids: Vec<String> = sub.messages().into_iter().map(|m| m.message.id).collect();
    assert_eq!(ids[0], "msg_gap");
    assert_eq!(ids.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn refetch_drops_messages_deleted_without_a_push() {
    let api = ScriptedApi::new(ME);
    api.seed_history(vec![
        message("msg_a", "usr_b", "first"),
        message("msg_b", "usr_b", "second"),
    ]);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;
    assert_eq!(sub.messages().len(), 2);

    api.remove_from_history("msg_a");
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        stream.send(ChatEvent::ping()).unwrap();
    }

    let ids: Vec<String> = sub.messages().into_iter().map(|m| m.message.id).collect();
    assert_eq!(ids, vec!["msg_b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn hung_refetch_does_not_stall_the_stream() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;
    let t0 = Instant::now();

    api.stall_fetches(true);
    tokio::time::sleep_until(t0 + Duration::from_secs(31)).await;
    assert_eq!(api.fetches().len(), 2, "reconcile fetch is in flight");

    stream
        .send(ChatEvent::NewMessage {
            message: message("msg_1", "usr_b", "arrives mid-fetch"),
        })
        .unwrap();

    // Default request timeout is 10s from the 30s tick.
    tokio::time::sleep_until(t0 + Duration::from_secs(41)).await;
    assert_eq!(sub.messages().len(), 1);
    assert!(sub.state().is_connected());
    assert_eq!(api.opens().len(), 1);
}

// ---------------------------------------------------------------------------
// Optimistic send
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn confirmed_send_and_echo_leave_one_message() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    let sent = sub.send(Draft::text("hello")).await.unwrap();
    assert_eq!(sub.messages().len(), 1);

    stream
        .send(ChatEvent::NewMessage {
            message: sent.clone(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = sub.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message.id, sent.id);
    assert_eq!(messages[0].state, DeliveryState::Confirmed);

    let request = &api.sent()[0];
    assert!(request.client_nonce.as_deref().unwrap().starts_with("temp_"));
}

#[tokio::test(start_paused = true)]
async fn failed_send_is_kept_and_retried_on_request() {
    let api = ScriptedApi::new(ME);
    api.fail_next_sends(1);
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();

    let err = sub.send(Draft::text("will fail")).await.unwrap_err();
    assert!(matches!(err, chat_client::ClientError::Status { status: 500, .. }));

    let messages = sub.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_failed());
    let temp_id = messages[0].message.id.clone();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.sent().len(), 1, "failed sends are never retried automatically");

    let confirmed = sub.retry(&temp_id).await.unwrap();
    let messages = sub.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message.id, confirmed.id);
    assert_eq!(
        api.sent()[1].client_nonce.as_deref(),
        Some(temp_id.as_str()),
        "retry reuses the nonce"
    );
}

#[tokio::test(start_paused = true)]
async fn discard_removes_failed_send() {
    let api = ScriptedApi::new(ME);
    api.fail_next_sends(1);
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();

    let _ = sub.send(Draft::text("nope")).await;
    let temp_id = sub.messages()[0].message.id.clone();

    assert!(sub.discard(&temp_id));
    assert!(sub.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn attachments_are_uploaded_before_persist() {
    let api = ScriptedApi::new(ME);
    let client = client(&api).with_uploader(Arc::new(common::FakeUploader));
    let sub = client.subscribe(CHAT).await.unwrap();

    let draft = Draft::text("see attached")
        .with_attachment(Attachment::pending("/tmp/diagram.png".into(), "image/png"));
    let sent = sub.send(draft).await.unwrap();

    let request = &api.sent()[0];
    assert_eq!(request.attachments[0].url, "https://cdn.example.com/diagram.png");
    assert!(!request.attachments[0].is_uploading);
    assert_eq!(sent.kind, coursechat_common::MessageKind::Image);
    assert!(!sub.messages()[0].message.is_uploading());
}

#[tokio::test(start_paused = true)]
async fn upload_without_uploader_marks_send_failed() {
    let api = ScriptedApi::new(ME);
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();

    let draft = Draft::text("").with_attachment(Attachment::pending("/tmp/a.pdf".into(), "application/pdf"));
    let err = sub.send(draft).await.unwrap_err();

    assert!(matches!(err, chat_client::ClientError::Upload(_)));
    assert!(sub.messages()[0].is_failed());
    assert!(api.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Pagination and scroll
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn load_older_prepends_and_restores_scroll() {
    let api = ScriptedApi::new(ME);
    api.seed_history(
        (1..=30)
            .map(|i| message(&format!("msg_{i:02}"), "usr_b", "history"))
            .collect(),
    );
    let client = client(&api);
    let mut events = client.events();
    let sub = client.subscribe(CHAT).await.unwrap();
    settle(Duration::from_secs(1), || sub.messages().len() == 20).await;
    assert_eq!(sub.messages()[0].message.id, "msg_11");

    let viewport = Viewport {
        scroll_top: 40.0,
        client_height: 600.0,
        scroll_height: 1800.0,
    };
    sub.set_viewport(viewport);
    while events.try_recv().is_ok() {}

    let added = sub.load_older().await.unwrap();
    assert_eq!(added, 10);
    assert_eq!(sub.messages().len(), 30);
    assert_eq!(sub.messages()[0].message.id, "msg_01");
    assert!(!sub.has_more());

    let mut restore = None;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Scroll { action, .. } = event {
            restore = Some(action);
        }
    }
    assert_eq!(restore, Some(ScrollAction::Restore(viewport.anchor())));

    assert_eq!(sub.load_older().await.unwrap(), 0, "nothing older");
}

#[tokio::test(start_paused = true)]
async fn scroll_follows_bottom_only_when_at_bottom() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let mut events = client.events();
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    let scroll_actions = |events: &mut tokio::sync::broadcast::Receiver<ClientEvent>| {
        let mut actions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::Scroll { action, .. } = event {
                actions.push(action);
            }
        }
        actions
    };
    scroll_actions(&mut events);

    // Scrolled up: no jump.
    sub.set_viewport(Viewport {
        scroll_top: 0.0,
        client_height: 600.0,
        scroll_height: 3000.0,
    });
    stream
        .send(ChatEvent::NewMessage {
            message: message("msg_1", "usr_b", "while reading history"),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(scroll_actions(&mut events).is_empty());

    // At the bottom: follow.
    sub.set_viewport(Viewport {
        scroll_top: 2400.0,
        client_height: 600.0,
        scroll_height: 3000.0,
    });
    stream
        .send(ChatEvent::NewMessage {
            message: message("msg_2", "usr_b", "live"),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(scroll_actions(&mut events), vec![ScrollAction::ToBottom]);

    // Own send always follows, even scrolled up.
    sub.set_viewport(Viewport {
        scroll_top: 0.0,
        client_height: 600.0,
        scroll_height: 3000.0,
    });
    sub.send(Draft::text("mine")).await.unwrap();
    assert_eq!(scroll_actions(&mut events), vec![ScrollAction::ToBottom]);
}

// ---------------------------------------------------------------------------
// Events and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn user_scoped_events_go_to_the_bus() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let mut events = client.events();
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    stream.send(ChatEvent::NotificationCount { count: 4 }).unwrap();
    stream.send(ChatEvent::Unknown).unwrap();
    stream.send(ChatEvent::ping()).unwrap();

    let found = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(ClientEvent::NotificationCount { count }) = events.recv().await {
                return count;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(found, 4);
    assert!(sub.state().is_connected(), "unknown kinds do not break the stream");
}

#[tokio::test(start_paused = true)]
async fn resubscribing_closes_the_previous_stream() {
    let api = ScriptedApi::new(ME);
    let first = api.queue_stream();
    let second = api.queue_stream();
    let client = client(&api);

    let old = client.subscribe(CHAT).await.unwrap();
    first.send(connected("sc_1")).unwrap();
    wait_connected(&old).await;

    let new = client.subscribe(CHAT).await.unwrap();
    second.send(connected("sc_2")).unwrap();
    wait_connected(&new).await;

    settle(Duration::from_secs(1), || first.is_closed()).await;
    assert_eq!(old.state(), ConnectionState::Disconnected);
    assert_eq!(api.opens().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_subscribes_leave_one_live_subscription() {
    for _ in 0..20 {
        let api = ScriptedApi::new(ME);
        let client = Arc::new(client(&api));

        let a = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe(CHAT).await.unwrap() }
        });
        let b = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe(CHAT).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let current = client.subscription(CHAT).unwrap();
        let stale = if Arc::ptr_eq(&current, &a) { b } else { a };
        assert!(!Arc::ptr_eq(&current, &stale));
        settle(Duration::from_secs(1), || stale.is_closed()).await;
        assert!(!current.is_closed());
    }
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_cancels_pending_reconnect() {
    let api = ScriptedApi::new(ME);
    let client = client(&api);
    let _sub = client.subscribe(CHAT).await.unwrap();
    settle(Duration::from_secs(1), || api.opens().len() == 1).await;

    assert!(client.unsubscribe(CHAT));
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(api.opens().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn typing_from_others_is_tracked() {
    let api = ScriptedApi::new(ME);
    let stream = api.queue_stream();
    let client = client(&api);
    let sub = client.subscribe(CHAT).await.unwrap();
    stream.send(connected("sc_1")).unwrap();
    wait_connected(&sub).await;

    for (user, name) in [(ME, "me"), ("usr_b", "Bea")] {
        stream
            .send(ChatEvent::Typing {
                chat_id: CHAT.to_string(),
                user_id: user.to_string(),
                display_name: name.to_string(),
                is_typing: true,
            })
            .unwrap();
    }
    settle(Duration::from_secs(1), || !sub.typing().is_empty()).await;

    assert_eq!(sub.typing(), vec!["Bea".to_string()]);
}
