//! Named shader parameters shared by the UI, OSC control and the renderer.
//!
//! The flow of a single edit:
//!
//! ```text
//!   slider / OSC / undo ──▶ UniformStore::set_values ──▶ clamp + store, dirty = true
//!                                   │
//!                                   ├─▶ persistence deadline (500 ms) ─┐
//!                                   ├─▶ undo window per name (250 ms) ─┼─▶ DebouncePump::flush_due
//!                                   └─▶ refresh deadline (5 ms) ───────┘
//!   render loop ──▶ UniformStore::pack_for_epoch ──▶ std140-style bytes ─▶ GPU buffer
//! ```
//!
//! A reload never edits the live table in place: it builds a staged
//! [`UniformTable`] from the new schema and installs it in one step, bumping
//! the schema epoch so the renderer can tell which layout the packed bytes
//! belong to.

mod debounce;
mod error;
mod pack;
mod persist;
mod store;
mod undo;
mod variable;

pub use debounce::{DebouncePump, DebounceSettings, FlushOutcome, RefreshCallback};
pub use error::{PersistError, PersistFileParseError};
pub use pack::{alignment_of, packed_layout, packed_size, size_of};
pub use persist::{format_persisted, parse_persisted, LoadReport, PersistedEntry};
pub use store::{read_persisted_entries, SetOptions, UniformStore, UniformTable};
pub use undo::{UndoEntry, UndoHistory, UndoSink};
pub use variable::UniformVariable;

pub use shaderschema::{ComponentType, UniformRange, UniformStyle};
