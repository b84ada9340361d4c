mod common;

use chrono::{ Duration, Utc };
use common::Harness;
use role_messenger::error::ChatError;
use role_messenger::models::websocket::{
    EVENT_CONVERSATION_UPDATED,
    EVENT_MESSAGE_NEW,
    EVENT_MESSAGE_SEEN,
};

#[tokio::test]
async fn leave_request_round_trip() {
    let h = Harness::new();
    let mut hr_session = h.hub.subscribe("H");
    let mut employee_session = h.hub.subscribe("E");
    let t0 = Utc::now();

    let receipt = h.service.send("E", "H", "Need leave approval", t0).await.unwrap();

    let incoming = hr_session.receiver.recv().await.unwrap();
    assert_eq!(incoming.event, EVENT_MESSAGE_NEW);
    assert_eq!(incoming.data["text"], "Need leave approval");
    assert_eq!(incoming.data["conversationId"], receipt.conversation_id.as_str());
    assert_eq!(hr_session.receiver.recv().await.unwrap().event, EVENT_CONVERSATION_UPDATED);
    assert_eq!(employee_session.receiver.recv().await.unwrap().event, EVENT_CONVERSATION_UPDATED);

    let thread = h.service.get_thread("H", &receipt.conversation_id).await.unwrap();
    assert_eq!(thread.len(), 1);
    h.service.mark_seen("H", &receipt.conversation_id).await.unwrap();

    let seen = employee_session.receiver.recv().await.unwrap();
    assert_eq!(seen.event, EVENT_MESSAGE_SEEN);
    assert_eq!(seen.data["seenBy"], "H");

    let summary = h.service.unread_summary("E").await.unwrap();
    assert_eq!(summary.total_unread, 0);
    assert!(summary.items.iter().all(|i| i.conversation_id != receipt.conversation_id));

    let reply = h.service
        .send("H", "E", "Approved, enjoy", t0 + Duration::seconds(5)).await
        .unwrap();
    assert_eq!(reply.conversation_id, receipt.conversation_id);

    let summary = h.service.unread_summary("E").await.unwrap();
    assert_eq!(summary.total_unread, 1);
    assert_eq!(summary.items[0].unread_count, 1);
    assert_eq!(summary.items[0].last_message_from.as_deref(), Some("H"));

    let contacts = h.service.list_contacts("E").await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].other_employee_id, "H");
    assert_eq!(contacts[0].other_name, "Hana");
    assert_eq!(contacts[0].last_message, "Approved, enjoy");
    assert_eq!(contacts[0].unread_count, 1);
}

#[tokio::test]
async fn first_contact_from_both_sides_shares_one_conversation() {
    let h = Harness::new();
    let now = Utc::now();
    let (a, b) = tokio::join!(
        h.service.send("E", "P", "hello pm", now),
        h.service.send("P", "E", "hello dev", now)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.conversation_id, b.conversation_id);

    let thread = h.service.get_thread("E", &a.conversation_id).await.unwrap();
    assert_eq!(thread.len(), 2);
}

#[tokio::test]
async fn history_stays_hidden_after_assignment_is_removed() {
    let h = Harness::new();
    let receipt = h.service.send("E", "H", "hi", Utc::now()).await.unwrap();

    let mut reassigned = common::staff();
    for emp in reassigned.iter_mut() {
        if emp.id == "E" {
            emp.assigned_hr = Some("someone-else".into());
        }
    }
    h.directory.replace(reassigned).await;

    assert!(h.service.list_contacts("E").await.unwrap().is_empty());
    assert!(h.service.list_contacts("H").await.unwrap().is_empty());
    assert_eq!(h.service.unread_summary("H").await.unwrap().total_unread, 0);
    assert!(matches!(
        h.service.get_thread("H", &receipt.conversation_id).await,
        Err(ChatError::Forbidden(_))
    ));
    assert!(matches!(h.service.send("E", "H", "again?", Utc::now()).await, Err(ChatError::Forbidden(_))));
}

#[tokio::test]
async fn offline_recipient_still_gets_the_message_on_reconnect() {
    let h = Harness::new();
    let receipt = h.service.send("D", "F", "all hands at 3", Utc::now()).await.unwrap();

    let mut late_session = h.hub.subscribe("F");
    assert!(late_session.receiver.try_recv().is_err());

    let contacts = h.service.list_contacts("F").await.unwrap();
    assert_eq!(contacts[0].conversation_id, receipt.conversation_id);
    assert_eq!(contacts[0].unread_count, 1);
    let thread = h.service.get_thread("F", &receipt.conversation_id).await.unwrap();
    assert_eq!(thread[0].message.text, "all hands at 3");
    assert_eq!(thread[0].from_name, "Dana");
}
