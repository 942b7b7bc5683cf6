use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chat_history::{ConversationTurn, HistorySink, HistoryStoreError, JsonlHistoryStore};
use serde_json::json;
use tempfile::TempDir;

fn turn(conversation_id: &str, prompt: &str, answer: &str) -> ConversationTurn {
    ConversationTurn {
        conversation_id: Some(conversation_id.to_owned()),
        chat_id: Some("chat-1".to_owned()),
        user_id: "123456".to_owned(),
        bot_id: Some("bot-1".to_owned()),
        prompt: prompt.to_owned(),
        answer: answer.to_owned(),
        tokens_used: 17,
    }
}

fn write_history_file(lines: &[String]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("history.jsonl");
    let mut file = File::create(&path).expect("history file should be created");

    for line in lines {
        writeln!(file, "{line}").expect("line should be written");
    }

    (dir, path)
}

fn record_line(id: &str, ts: &str, conversation_id: &str) -> String {
    json!({
        "id": id,
        "ts": ts,
        "conversation_id": conversation_id,
        "chat_id": "chat-1",
        "user_id": "123456",
        "bot_id": "bot-1",
        "prompt": "hi",
        "answer": "hello",
        "tokens_used": 3,
    })
    .to_string()
}

#[test]
fn missing_file_loads_as_empty_history() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = JsonlHistoryStore::open(dir.path().join("nested/history.jsonl"))
        .expect("store should open");

    assert!(store.load().expect("load").is_empty());
    assert!(dir.path().join("nested").is_dir());
}

#[test]
fn append_then_load_preserves_order_and_stamps_records() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = JsonlHistoryStore::open(dir.path().join("history.jsonl")).expect("store");

    let first = store
        .append(turn("conv-1", "如何预防流感", "勤洗手"))
        .expect("append");
    let second = store.append(turn("conv-2", "hi", "hello")).expect("append");

    let records = store.load().expect("load");
    assert_eq!(records, vec![first.clone(), second]);
    assert_eq!(first.answer, "勤洗手");
    assert_eq!(first.tokens_used, 17);
    assert_eq!(first.id.len(), 36);
}

#[test]
fn for_conversation_filters_records() {
    let (_dir, path) = write_history_file(&[
        record_line("r1", "2026-02-14T00:00:00Z", "conv-1"),
        record_line("r2", "2026-02-14T00:00:01Z", "conv-2"),
        String::new(),
        record_line("r3", "2026-02-14T00:00:02Z", "conv-1"),
    ]);
    let store = JsonlHistoryStore::open(&path).expect("store");

    let ids = store
        .for_conversation("conv-1")
        .expect("filter")
        .into_iter()
        .map(|record| record.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["r1", "r3"]);
}

#[test]
fn load_rejects_invalid_timestamp() {
    let (_dir, path) = write_history_file(&[
        record_line("r1", "2026-02-14T00:00:00Z", "conv-1"),
        record_line("r2", "yesterday", "conv-1"),
    ]);
    let store = JsonlHistoryStore::open(&path).expect("store");

    let error = store.load().expect_err("bad timestamp must fail");
    assert!(matches!(
        error,
        HistoryStoreError::InvalidTimestamp { line: 2, .. }
    ));
}

#[test]
fn load_rejects_malformed_json_with_line_number() {
    let (_dir, path) = write_history_file(&["{not json".to_owned()]);
    let store = JsonlHistoryStore::open(&path).expect("store");

    let error = store.load().expect_err("malformed line must fail");
    assert!(matches!(
        error,
        HistoryStoreError::JsonLineParse { line: 1, .. }
    ));
}

#[test]
fn concurrent_sinks_write_whole_lines() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = Arc::new(JsonlHistoryStore::open(dir.path().join("history.jsonl")).expect("store"));

    let handles = (0..8)
        .map(|index| {
            let sink: Arc<dyn HistorySink> = store.clone();
            std::thread::spawn(move || {
                for turn_index in 0..10 {
                    sink.record(turn(
                        &format!("conv-{index}"),
                        &format!("q{turn_index}"),
                        &"a".repeat(512),
                    ))
                    .expect("record");
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let records = store.load().expect("load");
    assert_eq!(records.len(), 80);
    assert_eq!(store.for_conversation("conv-3").expect("filter").len(), 10);
}
