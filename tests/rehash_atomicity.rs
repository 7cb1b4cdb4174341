//! Rehash: whole-table swaps, rollback on bad configuration, and
//! serialization of concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use slircbot::flags::Client;
use slircbot::handlers::HandlerCatalog;
use slircbot::registry::{Bindings, LiveBindings, RouteOutcome};
use slircbot::rehash::{FileSource, RehashCoordinator};

mod common;
use common::{CallLog, RecordingCommand};

const HEADER: &str = "[server]\nhost = \"irc.test\"\n";

/// A config binding `triggers` to the recording handler tagged `tag`.
fn config_with(tag: &str, triggers: &[&str]) -> String {
    let mut config = HEADER.to_string();
    for trigger in triggers {
        config.push_str(&format!(
            "\n[[command]]\ntrigger = \"{trigger}\"\nhandler = \"record\"\nargs = {{ tag = \"{tag}\" }}\n"
        ));
    }
    config
}

fn catalog(log: &CallLog) -> HandlerCatalog {
    let mut catalog = HandlerCatalog::with_builtins();
    let log = log.clone();
    catalog.register_command("record", move |args| {
        let tag = args
            .get("tag")
            .and_then(|v| v.as_str())
            .unwrap_or("untagged");
        Ok(RecordingCommand::new(tag, &log))
    });
    catalog
}

fn coordinator(path: &std::path::Path, log: &CallLog) -> RehashCoordinator {
    RehashCoordinator::new(
        Arc::new(LiveBindings::new(Bindings::default())),
        Arc::new(FileSource::new(path)),
        catalog(log),
    )
}

#[tokio::test]
async fn test_invalid_config_keeps_previous_tables() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bot.toml");
    std::fs::write(&path, config_with("v1", &["!ping"]))?;

    let log = CallLog::new();
    let coordinator = coordinator(&path, &log);
    coordinator.rehash().await?;

    // Unknown handler, malformed trigger, and unparseable TOML all fail.
    for bad in [
        format!("{HEADER}\n[[command]]\ntrigger = \"!ping\"\nhandler = \"missing\"\n"),
        format!("{HEADER}\n[[command]]\ntrigger = \"ping\"\nhandler = \"record\"\n"),
        "[server\nhost=".to_string(),
    ] {
        std::fs::write(&path, bad)?;
        assert!(coordinator.rehash().await.is_err());
    }

    let snapshot = coordinator.bindings().load();
    assert_eq!(snapshot.generation(), 2);

    let (parser, _rx) = common::parser();
    let outcome = snapshot
        .route(&parser, &common::services(), Utc::now(), "#bots", &Client::new("joe", "u", "h"), "!ping now")
        .await;
    assert!(matches!(outcome, RouteOutcome::Invoked));
    assert_eq!(log.entries(), ["v1(now)"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_recoverable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.toml");
    let coordinator = coordinator(&path, &CallLog::new());

    let err = coordinator.rehash().await.unwrap_err();
    assert_eq!(err.error_code(), "config");
    assert_eq!(coordinator.bindings().generation(), 1);

    std::fs::write(&path, config_with("late", &["!x"]))?;
    let report = coordinator.rehash().await?;
    assert_eq!(report.generation, 2);
    assert_eq!(report.commands, 1);
    Ok(())
}

#[tokio::test]
async fn test_in_flight_snapshot_survives_swap() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bot.toml");
    std::fs::write(&path, config_with("old", &["!a", "!b"]))?;

    let log = CallLog::new();
    let coordinator = coordinator(&path, &log);
    coordinator.rehash().await?;

    let held = coordinator.bindings().load();
    std::fs::write(&path, config_with("new", &["!c"]))?;
    coordinator.rehash().await?;

    // The held snapshot is unaffected by the swap.
    assert!(held.commands.contains("!a"));
    assert!(!held.commands.contains("!c"));

    let current = coordinator.bindings().load();
    assert!(!current.commands.contains("!a"));
    assert!(current.commands.contains("!c"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_tables_only() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let old_path = dir.path().join("old.toml");
    let new_path = dir.path().join("new.toml");
    let live_path = dir.path().join("live.toml");
    std::fs::write(&old_path, config_with("old", &["!a1", "!a2", "!a3"]))?;
    std::fs::write(&new_path, config_with("new", &["!b1", "!b2"]))?;
    std::fs::copy(&old_path, &live_path)?;

    let coordinator = Arc::new(coordinator(&live_path, &CallLog::new()));
    coordinator.rehash().await?;

    let mut readers = Vec::new();
    for _ in 0..4 {
        let live = Arc::clone(coordinator.bindings());
        readers.push(tokio::spawn(async move {
            for _ in 0..2_000 {
                let snapshot = live.load();
                let triggers = snapshot.commands.triggers();
                assert!(
                    triggers == ["!a1", "!a2", "!a3"] || triggers == ["!b1", "!b2"],
                    "mixed table observed: {triggers:?}"
                );
                tokio::task::yield_now().await;
            }
        }));
    }

    for i in 0..20 {
        let source = if i % 2 == 0 { &new_path } else { &old_path };
        std::fs::copy(source, &live_path)?;
        coordinator.rehash().await?;
    }

    for reader in readers {
        reader.await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_rehashes_are_serialized() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bot.toml");
    std::fs::write(&path, config_with("v", &["!x"]))?;
    let coordinator = Arc::new(coordinator(&path, &CallLog::new()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.rehash().await })
        })
        .collect();

    let mut generations = Vec::new();
    for task in tasks {
        generations.push(tokio::time::timeout(Duration::from_secs(10), task).await???.generation);
    }
    generations.sort_unstable();
    assert_eq!(generations, (2..=9).collect::<Vec<u64>>());
    Ok(())
}
