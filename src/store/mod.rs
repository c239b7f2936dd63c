pub mod path;
pub mod tree;

pub use tree::{EventKind, StoreEvent, TreeStore};
