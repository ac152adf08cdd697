//! Message sequencing and migration-on-read integration tests.

use pretty_assertions::assert_eq;
use sqlmate_store::{ChatHistory, KvStore, Message, MessageRole};
use sqlmate_test_utils::{FailureRule, ScriptedKvStore, legacy_message, seed_legacy_messages};
use std::sync::Arc;

fn history() -> (Arc<ScriptedKvStore>, ChatHistory) {
    let kv = Arc::new(ScriptedKvStore::new(FailureRule::Never));
    (kv.clone(), ChatHistory::new(kv))
}

/// Distinct saves come back complete and in sequence order.
#[tokio::test]
async fn saved_messages_list_in_sequence_order() {
    let (_, history) = history();
    let mut saved = Vec::new();
    for text in ["show tables", "describe orders", "count rows", "thanks"] {
        let message = Message::text("c1", MessageRole::User, text);
        saved.push(
            history
                .save_message("c1", &message)
                .await
                .expect("save")
                .id,
        );
    }

    let listed = history.list_messages("c1").await.expect("list");
    let ids: Vec<_> = listed.iter().map(|message| message.id.clone()).collect();
    assert_eq!(ids, saved);
    assert!(
        listed
            .windows(2)
            .all(|pair| pair[0].sequence <= pair[1].sequence)
    );
    assert!(history.get_chat("c1").await.expect("chat").is_some());
}

/// Editing a message in place does not move it.
#[tokio::test]
async fn resave_keeps_position() {
    let (_, history) = history();
    let first = history
        .save_message("c1", &Message::text("c1", MessageRole::Assistant, "SELECT"))
        .await
        .expect("save");
    for text in ["second", "third"] {
        history
            .save_message("c1", &Message::text("c1", MessageRole::User, text))
            .await
            .expect("save");
    }

    let mut edited = first.clone();
    edited.content = serde_json::json!([{ "type": "text", "text": "SELECT 1" }]);
    let stored = history.save_message("c1", &edited).await.expect("resave");

    assert_eq!(stored.sequence, first.sequence);
    let listed = history.list_messages("c1").await.expect("list");
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[0].content, edited.content);
}

/// A batch of new messages lands after everything already stored.
#[tokio::test]
async fn batch_sequences_follow_existing_maximum() {
    let (kv, history) = history();
    for text in ["one", "two"] {
        history
            .save_message("c1", &Message::text("c1", MessageRole::User, text))
            .await
            .expect("save");
    }
    kv.reset_writes();

    let batch: Vec<Message> = ["a", "b", "c", "d"]
        .iter()
        .map(|text| Message::text("c1", MessageRole::Assistant, text))
        .collect();
    let stored = history.save_messages("c1", &batch).await.expect("batch");

    let sequences: Vec<_> = stored.iter().map(|message| message.sequence).collect();
    assert_eq!(sequences, vec![Some(3), Some(4), Some(5), Some(6)]);
    assert_eq!(kv.writes_to("messages/c1"), 1);
    assert_eq!(history.list_messages("c1").await.expect("list").len(), 6);
}

/// Legacy records are numbered by creation time and the repair persists.
#[tokio::test]
async fn legacy_messages_are_migrated_once() {
    let (kv, history) = history();
    seed_legacy_messages(
        kv.as_ref(),
        "legacy",
        &[
            legacy_message("legacy", "m-c", 30),
            legacy_message("legacy", "m-b", 10),
            legacy_message("legacy", "m-a", 10),
            legacy_message("legacy", "m-d", 20),
        ],
    )
    .await;
    kv.reset_writes();

    let listed = history.list_messages("legacy").await.expect("list");
    let order: Vec<_> = listed
        .iter()
        .map(|message| (message.id.as_str(), message.sequence))
        .collect();
    assert_eq!(
        order,
        vec![
            ("m-a", Some(1)),
            ("m-b", Some(2)),
            ("m-d", Some(3)),
            ("m-c", Some(4)),
        ]
    );
    assert_eq!(kv.writes_to("messages/legacy"), 1);

    let stored = kv.get("messages/legacy").await.expect("get").expect("doc");
    assert_eq!(stored["m-c"]["sequence"], serde_json::json!(4));
    assert_eq!(stored["m-c"]["schemaVersion"], serde_json::json!(1));

    let again = history.list_messages("legacy").await.expect("list again");
    assert_eq!(again, listed);
    assert_eq!(kv.writes_to("messages/legacy"), 1);
}

/// A record with an unusable sequence forces the whole chat to be renumbered.
#[tokio::test]
async fn mixed_chat_is_renumbered_by_creation_time() {
    let (kv, history) = history();
    let mut modern = legacy_message("mixed", "m-late", 50);
    modern.sequence = Some(1);
    modern.schema_version = Some(1);
    let mut zeroed = legacy_message("mixed", "m-zero", 40);
    zeroed.sequence = Some(0);
    let early = legacy_message("mixed", "m-early", 5);

    let document = serde_json::json!({
        "m-late": modern,
        "m-zero": zeroed,
        "m-early": early,
    });
    kv.set("messages/mixed", document).await.expect("seed");

    let ids: Vec<_> = history
        .list_messages("mixed")
        .await
        .expect("list")
        .into_iter()
        .map(|message| (message.id, message.sequence))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("m-early".to_string(), Some(1)),
            ("m-zero".to_string(), Some(2)),
            ("m-late".to_string(), Some(3)),
        ]
    );
}

/// Migration still answers the read when the repair cannot be written.
#[tokio::test]
async fn migration_survives_a_full_substrate() {
    let (kv, history) = history();
    seed_legacy_messages(
        kv.as_ref(),
        "legacy",
        &[
            legacy_message("legacy", "m-2", 2),
            legacy_message("legacy", "m-1", 1),
        ],
    )
    .await;
    kv.set_rule(FailureRule::FirstWrites {
        key: "messages/legacy".to_string(),
        count: 1,
    });

    let listed = history.list_messages("legacy").await.expect("list");
    assert_eq!(listed[0].id, "m-1");
    assert_eq!(listed[1].sequence, Some(2));
    assert_eq!(kv.injected_failures(), 1);

    let stored = kv.get("messages/legacy").await.expect("get").expect("doc");
    assert!(stored["m-1"].get("sequence").is_none());

    history.list_messages("legacy").await.expect("list again");
    let stored = kv.get("messages/legacy").await.expect("get").expect("doc");
    assert_eq!(stored["m-1"]["sequence"], serde_json::json!(1));
}

/// Concurrent writers into one chat never share a sequence.
#[tokio::test]
async fn concurrent_saves_get_distinct_sequences() {
    let (_, history) = history();
    let history = Arc::new(history);
    let mut tasks = Vec::new();
    for worker in 0..4 {
        let history = history.clone();
        tasks.push(tokio::spawn(async move {
            for index in 0..10 {
                let text = format!("worker {worker} message {index}");
                history
                    .save_message("shared", &Message::text("shared", MessageRole::User, &text))
                    .await
                    .expect("save");
            }
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }

    let mut sequences: Vec<_> = history
        .list_messages("shared")
        .await
        .expect("list")
        .into_iter()
        .filter_map(|message| message.sequence)
        .collect();
    sequences.dedup();
    assert_eq!(sequences, (1..=40).collect::<Vec<u64>>());
}
