//! Shared helpers for editor integration tests

#![allow(dead_code)]

use ideamap_editor::{Document, Notification};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub type Seen = Rc<RefCell<Vec<Notification>>>;

/// Surface `tracing` output in failing tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn document(raw: Value, session: Option<&str>) -> anyhow::Result<(Document, Seen)> {
    init_tracing();
    let mut document = Document::from_value(&raw, session)?;
    let seen = record(&mut document);
    Ok((document, seen))
}

pub fn record(document: &mut Document) -> Seen {
    let seen: Seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    document.subscribe(move |notification| sink.borrow_mut().push(notification.clone()));
    seen
}

pub fn changed(command: &str, args: Value, session: Option<&str>) -> Notification {
    Notification::Changed {
        command: command.to_string(),
        args,
        session: session.map(str::to_string),
    }
}

/// Command names of every notification, `resourceStored` included
pub fn names(seen: &Seen) -> Vec<String> {
    seen.borrow()
        .iter()
        .map(|notification| notification.command().unwrap_or("resourceStored").to_string())
        .collect()
}
