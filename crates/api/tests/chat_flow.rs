//! End-to-end chat flows through the dispatcher.
//!
//! Each test wires an in-memory store, the real `WsManager` and the chat
//! service, registers fake connections and inspects the frames queued on
//! their channels. No socket is opened.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use classchat_api::state::AppState;
use classchat_core::chat::{ChatMessage, Session, Student, StudentStatus};
use classchat_core::types::Timestamp;
use classchat_db::{ChatStore, MemoryStore, MessageFilter, StoreError};
use common::{create_session, names, test_config, test_state, Client};
use serde_json::{json, Value};

/// Join and return the persistent id from `session_joined`.
async fn join_student(state: &AppState, client: &mut Client, session_id: &str, username: &str) -> String {
    client
        .emit(
            state,
            "join_room",
            json!({ "sessionId": session_id, "username": username, "role": "student" }),
        )
        .await;
    let joined = client.events("session_joined");
    joined[0]["studentId"].as_str().unwrap().to_string()
}

async fn send(state: &AppState, client: &Client, session_id: &str, text: &str, recipient: Option<&str>) {
    client
        .emit(
            state,
            "send_message",
            json!({ "sessionId": session_id, "message": { "text": text }, "recipient": recipient }),
        )
        .await;
}

fn texts(messages: &[Value]) -> Vec<&str> {
    messages.iter().filter_map(|m| m["text"].as_str()).collect()
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teacher_join_emits_identity_history_notice_and_roster() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;

    teacher
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ms. Lee", "role": "teacher" }),
        )
        .await;

    let events = teacher.drain();
    assert_eq!(
        names(&events),
        vec!["session_joined", "chat_history", "message", "student_list"]
    );
    assert_eq!(events[0]["data"]["role"], "teacher");
    assert!(events[0]["data"]["studentId"].is_null());
    assert_eq!(events[2]["data"]["text"], "Ms. Lee has joined as teacher");
    assert_eq!(events[2]["data"]["role"], "system");
    assert_eq!(events[2]["data"]["type"], "notification");
}

#[tokio::test]
async fn student_rejoin_with_different_case_keeps_identity() {
    let state = test_state();
    let sid = create_session(&state).await;

    let mut first = Client::connect(&state, "a1").await;
    let id = join_student(&state, &mut first, &sid, "Ana").await;
    assert!(id.starts_with(&format!("{sid}-ana-")));
    state.chat.disconnect("a1").await;

    let mut second = Client::connect(&state, "a2").await;
    let rejoined = join_student(&state, &mut second, &sid, "ana").await;
    assert_eq!(rejoined, id);

    let stored = state.store.find_student(&sid, &id).await.unwrap().unwrap();
    assert_eq!(stored.connection_id.as_deref(), Some("a2"));
    assert_eq!(stored.status, StudentStatus::Online);
}

#[tokio::test]
async fn supplied_id_of_another_student_is_not_reused() {
    let state = test_state();
    let sid = create_session(&state).await;

    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;

    let mut mallory = Client::connect(&state, "m1").await;
    mallory
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Mallory", "role": "student", "persistentStudentId": &ana_id }),
        )
        .await;
    let joined = mallory.events("session_joined");
    let mallory_id = joined[0]["studentId"].as_str().unwrap();
    assert_ne!(mallory_id, ana_id);

    let ana_record = state.store.find_student(&sid, &ana_id).await.unwrap().unwrap();
    assert_eq!(ana_record.username, "Ana");
    assert_eq!(ana_record.connection_id.as_deref(), Some("a1"));
}

#[tokio::test]
async fn blank_usernames_and_messages_are_rejected() {
    let state = test_state();
    let sid = create_session(&state).await;

    for (conn, blank) in [("c1", "   "), ("c2", "\t")] {
        let mut client = Client::connect(&state, conn).await;
        client
            .emit(
                &state,
                "join_room",
                json!({ "sessionId": sid, "username": blank, "role": "student" }),
            )
            .await;
        assert_eq!(names(&client.drain()), vec!["error"]);
    }
    assert!(state.store.list_students(&sid, true).await.unwrap().is_empty());

    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "  Ana  ").await;
    let stored = state.store.list_students(&sid, true).await.unwrap();
    assert_eq!(stored[0].username, "Ana");

    send(&state, &ana, &sid, " \n ", None).await;
    assert_eq!(names(&ana.drain()), vec!["error"]);
    send(&state, &ana, &sid, "  padded  ", None).await;
    let echo = ana.events("message");
    assert_eq!(texts(&echo), vec!["padded"]);
}

#[tokio::test]
async fn joining_unknown_or_ended_session_fails() {
    let state = test_state();
    let mut client = Client::connect(&state, "c1").await;

    client
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": "99999", "username": "Ana", "role": "student" }),
        )
        .await;
    let errors = client.events("error");
    assert_eq!(errors[0]["message"], "Session 99999 not found");

    let sid = create_session(&state).await;
    assert!(state.chat.end_session(&sid).await.unwrap());
    client
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ana", "role": "student" }),
        )
        .await;
    let errors = client.events("error");
    assert_eq!(errors[0]["message"], "Session has ended");
}

#[tokio::test]
async fn connection_cannot_join_twice() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    ana.drain();

    ana.emit(
        &state,
        "join_room",
        json!({ "sessionId": sid, "username": "Ana", "role": "student" }),
    )
    .await;
    assert_eq!(names(&ana.drain()), vec!["error"]);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_before_join_are_rejected() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut client = Client::connect(&state, "c1").await;

    send(&state, &client, &sid, "hello", None).await;

    let events = client.drain();
    assert_eq!(names(&events), vec!["error"]);
    assert_eq!(
        events[0]["data"]["message"],
        "Join the session before sending events"
    );
    let stored = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn malformed_frames_yield_one_error() {
    let state = test_state();
    let mut client = Client::connect(&state, "c1").await;

    state.chat.handle_frame("c1", "{not json").await;
    state
        .chat
        .handle_frame("c1", r#"{"event":"send_message","data":{"sessionId":"12345","message":{"text":""}}}"#)
        .await;

    assert_eq!(names(&client.drain()), vec!["error", "error"]);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_teacher_message_is_relabelled_for_the_student() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    send(&state, &teacher, &sid, "hi", Some(&ana_id)).await;

    let to_ana = ana.events("message");
    assert_eq!(to_ana.len(), 1);
    assert_eq!(to_ana[0]["sender"], "teacher");
    assert_eq!(to_ana[0]["recipient"], ana_id.as_str());

    let echo = teacher.events("message");
    assert_eq!(echo.len(), 1);
    assert_eq!(echo[0]["sender"], "t1");

    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn student_message_reaches_teacher_and_refreshes_roster() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    send(&state, &ana, &sid, "question", Some("ignored")).await;

    let events = teacher.drain();
    assert_eq!(names(&events), vec!["message", "student_list"]);
    assert_eq!(events[0]["data"]["sender"], ana_id.as_str());
    assert_eq!(events[0]["data"]["role"], "student");
    assert!(events[0]["data"]["recipient"].is_null());
    let roster = events[1]["data"].as_array().unwrap();
    let ana_entry = roster.iter().find(|s| s["id"] == ana_id.as_str()).unwrap();
    assert_eq!(ana_entry["status"], "active");

    let echo = ana.events("message");
    assert_eq!(echo.len(), 1);
    assert_eq!(echo[0]["sender"], "Ana");

    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn teacher_broadcast_reaches_every_student() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    send(&state, &teacher, &sid, "everyone", None).await;

    for student in [&mut ana, &mut bob] {
        let messages = student.events("message");
        assert_eq!(texts(&messages), vec!["everyone"]);
        assert_eq!(messages[0]["sender"], "teacher");
    }
    assert_eq!(texts(&teacher.events("message")), vec!["everyone"]);
}

#[tokio::test]
async fn ai_relay_reaches_teacher_and_the_student_only() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    ana.emit(
        &state,
        "send_message",
        json!({ "sessionId": sid, "message": { "text": "Try factoring", "role": "ai", "sender": "Tutor" } }),
    )
    .await;

    let to_teacher = teacher.events("message");
    assert_eq!(to_teacher.len(), 1);
    assert_eq!(to_teacher[0]["sender"], "ai-assistant");
    assert_eq!(to_teacher[0]["senderName"], "Tutor");
    assert_eq!(to_teacher[0]["recipient"], ana_id.as_str());
    assert_eq!(ana.events("message").len(), 1);
    assert!(bob.events("message").is_empty());
}

#[tokio::test]
async fn most_recent_teacher_connection_owns_the_slot() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut first = Client::connect(&state, "t1").await;
    first.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut second = Client::connect(&state, "t2").await;
    second.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    first.drain();
    second.drain();

    send(&state, &ana, &sid, "question", None).await;
    assert!(first.events("message").is_empty());
    assert_eq!(texts(&second.events("message")), vec!["question"]);

    // The superseded connection leaving does not clear the slot.
    state.chat.disconnect("t1").await;
    send(&state, &ana, &sid, "again", None).await;
    assert_eq!(texts(&second.events("message")), vec!["again"]);
}

#[tokio::test]
async fn typing_is_relayed_without_persistence() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    teacher.drain();
    ana.drain();
    let before = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap().len();

    ana.emit(&state, "typing", json!({ "sessionId": sid, "username": "Ana", "isTyping": true }))
        .await;
    let typing = teacher.events("user_typing");
    assert_eq!(typing, vec![json!({ "username": "Ana", "isTyping": true, "studentId": &ana_id })]);

    teacher
        .emit(
            &state,
            "typing",
            json!({ "sessionId": sid, "username": "Ms. Lee", "isTyping": false, "recipient": &ana_id }),
        )
        .await;
    let typing = ana.events("user_typing");
    assert_eq!(typing, vec![json!({ "username": "Ms. Lee", "isTyping": false })]);

    let after = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap().len();
    assert_eq!(before, after);
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[tokio::test]
async fn student_history_hides_other_students_private_threads() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    let bob_id = join_student(&state, &mut bob, &sid, "Bob").await;

    send(&state, &teacher, &sid, "for bob", Some(&bob_id)).await;
    send(&state, &bob, &sid, "bob question", None).await;
    send(&state, &teacher, &sid, "for ana", Some(&ana_id)).await;
    send(&state, &teacher, &sid, "everyone", None).await;
    send(&state, &ana, &sid, "ana question", None).await;

    state.chat.disconnect("a1").await;
    let mut rejoined = Client::connect(&state, "a2").await;
    rejoined
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ana", "role": "student" }),
        )
        .await;
    let history = rejoined.events("chat_history").remove(0);
    let history = history.as_array().unwrap();

    let seen = texts(history);
    for hidden in ["for bob", "bob question"] {
        assert!(!seen.contains(&hidden), "{hidden} leaked into {seen:?}");
    }
    for shown in ["for ana", "everyone", "ana question", "Bob has joined as student"] {
        assert!(seen.contains(&shown), "{shown} missing from {seen:?}");
    }
    for msg in history {
        if msg["role"] == "teacher" && !msg["recipient"].is_null() {
            assert_eq!(msg["recipient"], ana_id.as_str());
        }
        if msg["role"] == "student" {
            assert_eq!(msg["sender"], "Ana");
        }
    }
}

#[tokio::test]
async fn rejoin_history_never_exposes_the_teacher_connection() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "teacher-secret-conn").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    send(&state, &teacher, &sid, "hi", Some(&ana_id)).await;
    send(&state, &ana, &sid, "hello", None).await;

    state.chat.disconnect("a1").await;
    let mut rejoined = Client::connect(&state, "a2").await;
    rejoined
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ana", "role": "student" }),
        )
        .await;
    let history = rejoined.events("chat_history").remove(0);
    let senders: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["sender"].as_str())
        .collect();

    assert!(!senders.contains(&"teacher-secret-conn"), "{senders:?}");
    assert!(!senders.contains(&ana_id.as_str()), "{senders:?}");
    assert!(senders.contains(&"teacher"));
    assert!(senders.contains(&"Ana"));
}

#[tokio::test]
async fn teacher_history_is_the_full_session_history() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    send(&state, &teacher, &sid, "private", Some(&ana_id)).await;
    send(&state, &ana, &sid, "reply", None).await;

    let persisted = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap();

    let mut second = Client::connect(&state, "t2").await;
    second
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ms. Lee", "role": "teacher" }),
        )
        .await;
    let history = second.events("chat_history").remove(0);
    assert_eq!(history, serde_json::to_value(&persisted).unwrap());
}

#[tokio::test]
async fn history_survives_a_cleared_cache() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    send(&state, &teacher, &sid, "private", Some(&ana_id)).await;
    send(&state, &ana, &sid, "reply", None).await;

    let cached = state.chat.presence().load_history(&sid).await.unwrap();
    state.chat.presence().clear_session(&sid).await;
    let reloaded = state.chat.presence().load_history(&sid).await.unwrap();

    assert_eq!(reloaded, cached);
}

// ---------------------------------------------------------------------------
// Teacher actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn select_student_returns_history_tagged_with_requested_id() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    join_student(&state, &mut bob, &sid, "Bob").await;
    send(&state, &ana, &sid, "ana question", None).await;
    send(&state, &teacher, &sid, "ana answer", Some(&ana_id)).await;
    send(&state, &bob, &sid, "bob question", None).await;
    teacher.drain();

    // Select by connection id; the reply carries that id back.
    teacher
        .emit(&state, "select_student", json!({ "sessionId": sid, "studentId": "a1" }))
        .await;
    let reply = teacher.events("student_chat_history").remove(0);
    assert_eq!(reply["studentId"], "a1");
    assert_eq!(
        texts(reply["chat"].as_array().unwrap()),
        vec!["ana question", "ana answer"]
    );
}

#[tokio::test]
async fn select_student_requires_teacher_and_known_student() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    teacher.drain();
    ana.drain();

    ana.emit(&state, "select_student", json!({ "sessionId": sid, "studentId": &ana_id }))
        .await;
    assert_eq!(names(&ana.drain()), vec!["error"]);

    teacher
        .emit(&state, "select_student", json!({ "sessionId": sid, "studentId": "nobody" }))
        .await;
    let errors = teacher.events("error");
    assert_eq!(errors[0]["message"], "Student nobody not found");
}

#[tokio::test]
async fn kick_disconnects_and_forgets_the_student() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    let bob_id = join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    teacher
        .emit(&state, "kick_student", json!({ "sessionId": sid, "persistentId": &ana_id }))
        .await;

    assert_eq!(names(&ana.drain()), vec!["kicked_from_session", "close"]);
    assert!(!state.ws_manager.is_connected("a1").await);

    let events = teacher.drain();
    assert_eq!(names(&events), vec!["message", "student_kicked", "student_list"]);
    assert_eq!(events[0]["data"]["text"], "Ana was removed from the session");
    assert_eq!(
        events[1]["data"],
        json!({ "studentId": &ana_id, "success": true })
    );
    let roster: Vec<&str> = events[2]["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["id"].as_str())
        .collect();
    assert_eq!(roster, vec![bob_id.as_str()]);

    assert!(state.store.find_student(&sid, &ana_id).await.unwrap().is_none());
    assert!(state.chat.presence().find_student(&sid, &ana_id).await.is_none());
    assert!(bob.drain().is_empty());

    // The transport noticing the closed socket later is a no-op.
    state.chat.disconnect("a1").await;
    assert!(teacher.drain().is_empty());
}

#[tokio::test]
async fn kick_failures_are_reported_as_unsuccessful() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    let mut bob = Client::connect(&state, "b1").await;
    let bob_id = join_student(&state, &mut bob, &sid, "Bob").await;
    for client in [&mut teacher, &mut ana, &mut bob] {
        client.drain();
    }

    ana.emit(&state, "kick_student", json!({ "sessionId": sid, "studentId": &bob_id }))
        .await;
    let refused = ana.events("student_kicked");
    assert_eq!(refused[0]["success"], false);
    assert!(state.store.find_student(&sid, &bob_id).await.unwrap().is_some());

    teacher
        .emit(&state, "kick_student", json!({ "sessionId": sid, "studentId": "ghost" }))
        .await;
    let missing = teacher.events("student_kicked");
    assert_eq!(
        missing[0],
        json!({ "studentId": "ghost", "success": false, "message": "Student not found" })
    );
    assert!(state.store.find_student(&sid, &ana_id).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Leave / disconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn student_leave_marks_offline_and_notifies_teacher() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut ana, &sid, "Ana").await;
    teacher.drain();
    ana.drain();

    ana.emit(&state, "leave_room", json!({ "sessionId": sid, "username": "Ana" }))
        .await;

    let events = teacher.drain();
    assert_eq!(names(&events), vec!["message", "student_list"]);
    assert_eq!(events[0]["data"]["text"], "Ana has left the session");
    assert_eq!(events[0]["data"]["sender"], ana_id.as_str());
    assert_eq!(events[1]["data"], json!([]));
    assert!(ana.drain().is_empty());

    let stored = state.store.find_student(&sid, &ana_id).await.unwrap().unwrap();
    assert_eq!(stored.status, StudentStatus::Offline);

    // Left is terminal: further events are rejected.
    send(&state, &ana, &sid, "still here?", None).await;
    assert_eq!(names(&ana.drain()), vec!["error"]);
}

#[tokio::test]
async fn stale_connection_disconnect_keeps_student_online() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut old = Client::connect(&state, "a1").await;
    let ana_id = join_student(&state, &mut old, &sid, "Ana").await;
    let mut new = Client::connect(&state, "a2").await;
    join_student(&state, &mut new, &sid, "Ana").await;
    teacher.drain();

    state.chat.disconnect("a1").await;

    assert!(teacher.drain().is_empty());
    let stored = state.store.find_student(&sid, &ana_id).await.unwrap().unwrap();
    assert_eq!(stored.status, StudentStatus::Online);
    assert_eq!(stored.connection_id.as_deref(), Some("a2"));
}

#[tokio::test]
async fn teacher_leave_notifies_students_and_clears_slot() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    teacher.drain();
    ana.drain();

    teacher
        .emit(&state, "leave_room", json!({ "sessionId": sid, "username": "Ms. Lee" }))
        .await;

    let notice = ana.events("message");
    assert_eq!(notice[0]["role"], "system");
    assert_eq!(notice[0]["text"], "Ms. Lee (teacher) has left the session");
    assert_eq!(state.chat.presence().teacher(&sid).await, None);

    send(&state, &ana, &sid, "anyone?", None).await;
    assert!(teacher.drain().is_empty());
    assert_eq!(texts(&ana.events("message")), vec!["anyone?"]);
}

#[tokio::test]
async fn ending_a_session_detaches_joined_connections() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    teacher.drain();
    ana.drain();

    assert!(state.chat.end_session(&sid).await.unwrap());
    for client in [&mut teacher, &mut ana] {
        let notice = client.events("message");
        assert_eq!(texts(&notice), vec!["Session has ended"]);
    }

    send(&state, &ana, &sid, "after end", None).await;
    assert_eq!(names(&ana.drain()), vec!["error"]);
    assert!(teacher.drain().is_empty());

    let stored = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap();
    assert!(stored.iter().all(|m| m.text != "after end"));
}

#[tokio::test]
async fn last_departure_evicts_the_session_from_presence() {
    let state = test_state();
    let sid = create_session(&state).await;
    let mut teacher = Client::connect(&state, "t1").await;
    teacher.join(&state, &sid, "Ms. Lee", "teacher").await;
    let mut ana = Client::connect(&state, "a1").await;
    join_student(&state, &mut ana, &sid, "Ana").await;
    send(&state, &ana, &sid, "question", None).await;

    state.chat.disconnect("a1").await;
    assert_eq!(state.chat.presence().session_count().await, 1);
    state.chat.disconnect("t1").await;
    assert_eq!(state.chat.presence().session_count().await, 0);
    let persisted = state.store.list_messages(&sid, &MessageFilter::All).await.unwrap();

    let mut back = Client::connect(&state, "t2").await;
    back.emit(
        &state,
        "join_room",
        json!({ "sessionId": sid, "username": "Ms. Lee", "role": "teacher" }),
    )
    .await;
    let history = back.events("chat_history").remove(0);
    assert_eq!(history, serde_json::to_value(&persisted).unwrap());
    assert!(texts(history.as_array().unwrap()).contains(&"question"));
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryStore` but refuses to persist messages.
struct ReadOnlyMessages(MemoryStore);

#[async_trait]
impl ChatStore for ReadOnlyMessages {
    fn backend(&self) -> &'static str {
        "read-only"
    }
    async fn health_check(&self) -> Result<(), StoreError> {
        self.0.health_check().await
    }
    async fn create_session(&self, teacher_id: Option<&str>) -> Result<Session, StoreError> {
        self.0.create_session(teacher_id).await
    }
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.0.get_session(id).await
    }
    async fn end_session(&self, id: &str) -> Result<bool, StoreError> {
        self.0.end_session(id).await
    }
    async fn upsert_student(&self, student: &Student) -> Result<(), StoreError> {
        self.0.upsert_student(student).await
    }
    async fn find_student(&self, session_id: &str, key: &str) -> Result<Option<Student>, StoreError> {
        self.0.find_student(session_id, key).await
    }
    async fn find_student_by_username(
        &self,
        session_id: &str,
        username: &str,
    ) -> Result<Option<Student>, StoreError> {
        self.0.find_student_by_username(session_id, username).await
    }
    async fn list_students(
        &self,
        session_id: &str,
        include_offline: bool,
    ) -> Result<Vec<Student>, StoreError> {
        self.0.list_students(session_id, include_offline).await
    }
    async fn update_student_status(
        &self,
        session_id: &str,
        id: &str,
        status: StudentStatus,
        last_active: Timestamp,
    ) -> Result<bool, StoreError> {
        self.0
            .update_student_status(session_id, id, status, last_active)
            .await
    }
    async fn delete_student(&self, session_id: &str, id: &str) -> Result<bool, StoreError> {
        self.0.delete_student(session_id, id).await
    }
    async fn insert_message(&self, _msg: &ChatMessage) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn list_messages(
        &self,
        session_id: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.0.list_messages(session_id, filter).await
    }
}

#[tokio::test]
async fn storage_failure_is_reported_only_to_the_sender() {
    let store: Arc<dyn ChatStore> = Arc::new(ReadOnlyMessages(MemoryStore::new()));
    let state = AppState::new(store, test_config());
    let sid = create_session(&state).await;

    let mut teacher = Client::connect(&state, "t1").await;
    teacher
        .emit(
            &state,
            "join_room",
            json!({ "sessionId": sid, "username": "Ms. Lee", "role": "teacher" }),
        )
        .await;
    // Joined, but the join notice could not be stored.
    let events = teacher.drain();
    assert_eq!(names(&events), vec!["session_joined", "chat_history", "error"]);
    assert_eq!(events[2]["data"]["message"], "Operation failed, please try again");

    let mut ana = Client::connect(&state, "a1").await;
    ana.join(&state, &sid, "Ana", "student").await;
    teacher.drain();

    send(&state, &ana, &sid, "question", None).await;
    assert_eq!(names(&ana.drain()), vec!["error"]);
    assert!(teacher.drain().is_empty());
}
