#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use plain_state::{ChangeEvent, Document, LocalHub};

/// `n` replicas with fixed session IDs, all connected to one hub.
pub fn create_replicas(n: usize) -> (LocalHub, Vec<Document>) {
    let hub = LocalHub::new();
    let docs: Vec<Document> = (0..n)
        .map(|i| {
            let doc = Document::with_sid(100_000 + i as u64);
            doc.connect(&hub);
            doc
        })
        .collect();
    (hub, docs)
}

/// Deliver all traffic, then drain every replica's event queue.
pub fn flush_all(hub: &LocalHub, docs: &[Document]) {
    hub.flush();
    for doc in docs {
        doc.flush_events();
    }
}

/// Counts how often a change handler ran.
#[derive(Clone, Default)]
pub struct Spy {
    calls: Rc<Cell<usize>>,
}

impl Spy {
    pub fn handler(&self) -> impl FnMut(&ChangeEvent) + 'static {
        let calls = self.calls.clone();
        move |_| calls.set(calls.get() + 1)
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}
