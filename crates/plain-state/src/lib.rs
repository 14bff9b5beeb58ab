//! plain-state: replicated JSON documents edited through plain proxies.
//!
//! Application code reads and writes a [`Document`] through [`MapProxy`] and
//! [`SeqProxy`] views as if it were ordinary JSON. Every write is translated
//! into operations on a conflict-free node tree (LWW maps, RGA sequences),
//! applied locally at once and shipped to other replicas over a
//! [`Transport`]. Replicas that have exchanged all their patches hold the
//! same value whatever order the patches arrived in.
//!
//! ```
//! use plain_state::{Document, LocalHub};
//! use serde_json::json;
//!
//! let hub = LocalHub::new();
//! let a = Document::with_sid(100_001);
//! let b = Document::with_sid(100_002);
//! a.connect(&hub);
//! b.connect(&hub);
//!
//! a.root().set("child", json!({"x": 4})).unwrap();
//! hub.flush();
//! b.root().map("child").unwrap().increment("x", 1).unwrap();
//! hub.flush();
//! assert_eq!(a.view(), json!({"child": {"x": 5}}));
//! ```

pub mod bridge;
pub mod crdt;
pub mod crdt_patch;
pub mod document;
pub mod error;
pub mod notifier;
pub mod proxy;
pub mod translator;
pub mod value;

pub use bridge::local::{Envelope, LocalHub, LocalSession};
pub use bridge::transport::{Session, Transport};
pub use bridge::{ReceiveOutcome, MAX_DEFERRED_BATCHES};
pub use crdt_patch::clock::Ts;
pub use document::Document;
pub use error::{ConflictReason, DocError, MergeConflict};
pub use notifier::{ChangeEvent, ChangeOrigin, ListenerId};
pub use proxy::{MapProxy, Proxy, SeqProxy};
