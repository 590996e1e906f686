//! Undo/redo across sessions, batches and multi-idea operations
//!
//! This tests:
//! - Selective undo of the calling session's nearest entry
//! - Redo retention across sessions
//! - Batch flushing and notifications
//! - Title initialisation merging into the previous step
//! - Entries invalidated by another session

mod common;

use common::{changed, document, names};
use ideamap_editor::{Command, IdeaId, MutationError, Rank};
use serde_json::{json, Value};
use std::sync::Arc;

fn id(base: i64) -> IdeaId {
    IdeaId::new(base)
}

fn title(document: &ideamap_editor::Document, base: i64) -> String {
    document
        .find_idea(&id(base))
        .map(|idea| idea.title.clone())
        .unwrap_or_default()
}

fn two_ideas() -> Value {
    json!({
        "id": 1,
        "ideas": {"1": {"id": 2, "title": "a"}, "2": {"id": 3, "title": "b"}}
    })
}

fn retitle(base: i64, title: &str) -> Command {
    Command::UpdateTitle {
        id: id(base),
        title: title.to_string(),
    }
}

#[test]
fn test_undo_redo_restores_document() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    let before = document.to_value();

    let child = document.add_sub_idea(2, Some("child"))?;
    document.update_attr(child.clone(), "color", json!("red"))?;
    document.add_link(child.clone(), 3)?;
    document.flip(3)?;
    document.store_resource(json!({"blob": 1}), None)?;
    let after = document.to_value();

    for _ in 0..5 {
        document.undo()?;
    }
    assert_eq!(document.to_value(), before);
    assert_eq!(document.undo(), Err(MutationError::NothingToUndo));

    for _ in 0..5 {
        document.redo()?;
    }
    assert_eq!(document.to_value(), after);
    assert_eq!(document.redo(), Err(MutationError::NothingToRedo));
    Ok(())
}

#[test]
fn test_undo_only_reverts_own_session() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    document.exec_command(retitle(2, "a1"), Some("A"))?;
    document.exec_command(retitle(3, "b1"), Some("B"))?;
    document.exec_command(retitle(2, "a2"), Some("A"))?;

    document.undo_for(Some("A"))?;
    assert_eq!((title(&document, 2), title(&document, 3)), ("a1".into(), "b1".into()));

    document.undo_for(Some("A"))?;
    assert_eq!((title(&document, 2), title(&document, 3)), ("a".into(), "b1".into()));
    assert_eq!(document.undo_for(Some("A")), Err(MutationError::NothingToUndo));

    document.undo_for(Some("B"))?;
    assert_eq!(title(&document, 3), "b");
    Ok(())
}

#[test]
fn test_undo_and_redo_notifications() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), Some("s"))?;
    document.update_title(2, "x")?;
    document.undo()?;
    document.redo()?;
    let seen = seen.borrow();
    assert_eq!(seen[1], changed("undo", json!([]), Some("s")));
    assert_eq!(seen[2], changed("redo", Value::Null, Some("s")));
    Ok(())
}

#[test]
fn test_failed_undo_is_silent() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    assert_eq!(document.undo(), Err(MutationError::NothingToUndo));
    assert_eq!(document.redo(), Err(MutationError::NothingToRedo));
    assert!(seen.borrow().is_empty());
    Ok(())
}

#[test]
fn test_redo_only_replays_own_session() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    document.exec_command(retitle(2, "a1"), Some("A"))?;
    document.exec_command(retitle(3, "b1"), Some("B"))?;
    document.undo_for(Some("A"))?;
    document.undo_for(Some("B"))?;

    document.redo_for(Some("B"))?;
    assert_eq!((title(&document, 2), title(&document, 3)), ("a".into(), "b1".into()));
    assert!(document.history().can_redo(Some("A")));
    assert_eq!(document.redo_for(Some("B")), Err(MutationError::NothingToRedo));
    Ok(())
}

#[test]
fn test_new_command_keeps_redo_of_other_sessions() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    document.exec_command(retitle(2, "a1"), Some("A"))?;
    document.undo_for(Some("A"))?;

    document.exec_command(retitle(3, "b1"), Some("B"))?;
    document.redo_for(Some("A"))?;
    assert_eq!(title(&document, 2), "a1");

    document.undo_for(Some("A"))?;
    document.exec_command(retitle(3, "b2"), Some("A"))?;
    assert_eq!(document.redo_for(Some("A")), Err(MutationError::NothingToRedo));
    Ok(())
}

#[test]
fn test_exec_command_undo_uses_given_session() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), Some("default"))?;
    document.exec_command(retitle(2, "mine"), Some("other"))?;
    assert_eq!(document.undo(), Err(MutationError::NothingToUndo));

    document.exec_command(Command::Undo, Some("other"))?;
    assert_eq!(title(&document, 2), "a");
    assert_eq!(seen.borrow()[1], changed("undo", json!([]), Some("other")));
    Ok(())
}

#[test]
fn test_batch_is_one_undo_step() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let before = document.to_value();

    document.start_batch();
    let child = document.add_sub_idea(2, Some("child"))?;
    document.update_title(3, "renamed")?;
    assert!(seen.borrow().is_empty());
    document.end_batch();

    assert_eq!(
        seen.borrow()[0],
        changed(
            "batch",
            json!([["addSubIdea", 2, "child", child.to_value()], ["updateTitle", 3, "renamed"]]),
            None
        )
    );
    assert_eq!(document.history().undo_levels(), 1);

    document.undo()?;
    assert_eq!(document.to_value(), before);
    document.redo()?;
    assert_eq!(title(&document, 3), "renamed");
    assert!(document.find_idea(&child).is_some());
    Ok(())
}

#[test]
fn test_start_batch_flushes_open_batch() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.start_batch();
    document.update_title(2, "first")?;
    document.start_batch();
    document.update_title(3, "second")?;
    document.end_batch();

    assert_eq!(names(&seen), vec!["updateTitle", "updateTitle"]);
    assert_eq!(document.history().undo_levels(), 2);
    Ok(())
}

#[test]
fn test_undo_flushes_open_batch_first() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.start_batch();
    document.update_title(2, "x")?;
    document.update_title(3, "y")?;
    document.undo()?;

    assert_eq!(names(&seen), vec!["batch", "undo"]);
    assert_eq!((title(&document, 2), title(&document, 3)), ("a".into(), "b".into()));
    Ok(())
}

#[test]
fn test_batches_are_per_session() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.start_batch_for(Some("A"));
    document.exec_command(retitle(2, "from A"), Some("A"))?;
    document.exec_command(retitle(3, "from B"), Some("B"))?;
    assert_eq!(names(&seen), vec!["updateTitle"]);
    assert_eq!(seen.borrow()[0].session(), Some("B"));

    document.end_batch_for(Some("A"));
    assert_eq!(names(&seen), vec!["updateTitle", "updateTitle"]);
    assert_eq!(seen.borrow()[1].session(), Some("A"));
    Ok(())
}

#[test]
fn test_batch_closure_returns_result() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let created = document.batch(|document| -> anyhow::Result<IdeaId> {
        let created = document.add_sub_idea(1, Some("new"))?;
        document.update_attr(created.clone(), "collapsed", json!(true))?;
        Ok(created)
    })?;
    assert_eq!(names(&seen), vec!["batch"]);
    assert_eq!(document.get_attr_by_id(&created, "collapsed"), Some(json!(true)));
    Ok(())
}

#[test]
fn test_batch_command_records_resources_at_dispatch() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.exec_command(
        Command::Batch {
            commands: vec![
                Command::StoreResource {
                    content: Arc::new(json!("blob")),
                    key: None,
                },
                retitle(2, "x"),
            ],
        },
        None,
    )?;
    assert_eq!(names(&seen), vec!["resourceStored", "batch"]);

    document.undo()?;
    assert!(document.content().resources.is_empty());
    assert_eq!(title(&document, 2), "a");
    Ok(())
}

#[test]
fn test_batch_command_with_only_failures() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let result = document.exec_command(
        Command::Batch {
            commands: vec![retitle(99, "x"), retitle(2, "a")],
        },
        None,
    );
    assert_eq!(result, Err(MutationError::NoChange));
    assert!(seen.borrow().is_empty());
    assert_eq!(document.history().undo_levels(), 0);
    Ok(())
}

#[test]
fn test_initialise_title_merges_into_previous_step() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let created = document.add_sub_idea(1, None)?;
    document.initialise_title(created.clone(), "named")?;

    assert_eq!(names(&seen), vec!["addSubIdea", "initialiseTitle"]);
    assert_eq!(document.history().undo_levels(), 1);

    document.undo()?;
    assert!(document.find_idea(&created).is_none());
    document.redo()?;
    assert_eq!(
        document.find_idea(&created).map(|idea| idea.title.clone()),
        Some("named".into())
    );
    Ok(())
}

#[test]
fn test_initialise_title_merges_with_own_session_only() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    document.exec_command(retitle(2, "by A"), Some("A"))?;
    document.exec_command(retitle(3, "by B"), Some("B"))?;
    document.exec_command(
        Command::InitialiseTitle {
            id: id(2),
            title: "named by A".into(),
        },
        Some("A"),
    )?;
    assert_eq!(document.history().undo_levels(), 2);

    document.undo_for(Some("A"))?;
    assert_eq!((title(&document, 2), title(&document, 3)), ("a".into(), "by B".into()));
    Ok(())
}

#[test]
fn test_initialise_title_alone_is_its_own_step() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    document.initialise_title(2, "first")?;
    assert_eq!(document.history().undo_levels(), 1);
    document.undo()?;
    assert_eq!(title(&document, 2), "a");
    Ok(())
}

#[test]
fn test_initialise_title_joins_open_batch() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.update_title(3, "earlier")?;
    document.start_batch();
    let created = document.add_sub_idea(1, None)?;
    document.initialise_title(created, "named")?;
    document.end_batch();

    assert_eq!(names(&seen), vec!["updateTitle", "batch"]);
    assert_eq!(document.history().undo_levels(), 2);
    Ok(())
}

#[test]
fn test_stale_entry_leaves_history_untouched() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    document.exec_command(retitle(2, "edited"), Some("A"))?;
    document.exec_command(Command::RemoveSubIdea { id: id(2) }, Some("B"))?;

    let result = document.undo_for(Some("A"));
    assert!(matches!(result, Err(MutationError::StaleHistory(_))), "{result:?}");
    assert_eq!(document.history().undo_levels(), 2);
    assert_eq!(document.history().redo_levels(), 0);
    assert_eq!(names(&seen), vec!["updateTitle", "removeSubIdea"]);

    document.undo_for(Some("B"))?;
    document.undo_for(Some("A"))?;
    assert_eq!(title(&document, 2), "a");
    Ok(())
}

#[test]
fn test_foreign_edit_keeps_reinserted_idea_rank_free() -> anyhow::Result<()> {
    let (mut document, _) = document(json!({"id": 1, "ideas": {"1": {"id": 2}}}), None)?;
    document.exec_command(Command::RemoveSubIdea { id: id(2) }, Some("A"))?;
    document.exec_command(
        Command::AddSubIdea {
            parent_id: id(1),
            title: Some("taken".into()),
            id: None,
        },
        Some("B"),
    )?;

    // Idea 2 comes back next to the idea that took its rank
    document.undo_for(Some("A"))?;
    let root = document.root();
    assert_eq!(root.ideas.len(), 2);
    assert!(root.find_child_rank_by_id(&id(2)).is_some());
    assert_eq!(root.find_child_rank_by_id(&IdeaId::tagged(2, "B")), Some(Rank::from(1)));
    Ok(())
}

#[test]
fn test_remove_multiple_is_one_step() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let results = document.remove_multiple(&[id(2), id(99), id(3)]);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok() && results[2].is_ok());
    assert_eq!(results[1], Err(MutationError::IdeaNotFound(id(99))));
    assert!(document.root().ideas.is_empty());
    assert_eq!(names(&seen), vec!["batch"]);

    document.undo()?;
    assert_eq!(document.root().ideas.len(), 2);
    Ok(())
}

#[test]
fn test_paste_multiple() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), None)?;
    let results = document.paste_multiple(2, &[json!({"title": "x"}), json!({}), json!({"title": "y"})]);
    assert_eq!(results[0], Ok(id(4)));
    assert_eq!(results[1], Err(MutationError::NothingToPaste));
    assert_eq!(results[2], Ok(id(5)));
    assert_eq!(document.history().undo_levels(), 1);
    Ok(())
}

#[test]
fn test_insert_intermediate_multiple() -> anyhow::Result<()> {
    let (mut document, seen) = document(
        json!({"id": 1, "ideas": {"1": {"id": 2}, "2": {"id": 3}, "3": {"id": 4}}}),
        None,
    )?;
    let before = document.to_value();

    let parent = document.insert_intermediate_multiple(&[id(4), id(2)])?;
    assert_eq!(parent, id(5));
    let grouped = document.find_idea(&parent).cloned().unwrap_or_else(|| panic!("new parent"));
    assert_eq!(grouped.ideas[&Rank::from(1)].id, id(4));
    assert_eq!(grouped.ideas[&Rank::from(2)].id, id(2));
    assert_eq!(document.root().find_child_rank_by_id(&parent), Some(Rank::from(3)));
    assert_eq!(names(&seen), vec!["batch"]);

    document.undo()?;
    assert_eq!(document.to_value(), before);
    assert!(document.insert_intermediate_multiple(&[]).is_err());
    Ok(())
}

#[test]
fn test_insert_intermediate_multiple_skips_missing_ideas() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let before = document.to_value();

    let parent = document.insert_intermediate_multiple(&[id(2), id(99)])?;
    assert_eq!(parent, id(4));
    assert_eq!(
        document.root().find_parent(&id(2)).map(|idea| idea.id.clone()),
        Some(parent)
    );
    assert_eq!(document.history().undo_levels(), 1);
    assert_eq!(names(&seen), vec!["insertIntermediate"]);

    document.undo()?;
    assert_eq!(document.to_value(), before);
    Ok(())
}

#[test]
fn test_insert_intermediate_multiple_with_missing_first_idea() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let before = document.to_value();

    assert_eq!(
        document.insert_intermediate_multiple(&[id(99), id(2)]),
        Err(MutationError::IdeaNotFound(id(99)))
    );
    assert_eq!(document.to_value(), before);
    assert_eq!(document.history().undo_levels(), 0);
    assert!(seen.borrow().is_empty());
    Ok(())
}

#[test]
fn test_unsubscribed_listener_is_not_called() -> anyhow::Result<()> {
    let (mut document, seen) = document(two_ideas(), None)?;
    let extra = common::record(&mut document);
    document.update_title(2, "x")?;

    let handle = document.subscribe(|_| {});
    assert!(document.unsubscribe(handle));
    assert!(!document.unsubscribe(handle));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(extra.borrow().len(), 1);
    Ok(())
}

#[test]
fn test_history_entries_serialize() -> anyhow::Result<()> {
    let (mut document, _) = document(two_ideas(), Some("s"))?;
    document.update_title(2, "x")?;
    let entries = serde_json::to_value(document.history().entries())?;
    assert_eq!(entries[0]["session"], json!("s"));
    assert_eq!(entries[0]["commands"][0]["command"]["type"], json!("updateTitle"));
    assert_eq!(
        entries[0]["commands"][0]["steps"][0]["inverse"],
        json!({"type": "setTitle", "id": 2, "title": "a"})
    );
    Ok(())
}
