//! # Property Graph Model
//!
//! Clean DTOs shared by every layer: storage ↔ synthesis ↔ extraction ↔ user.
//!
//! Design rule: this module is pure data — no I/O, no state, no async.
//! Descendant-set math lives in `crate::tipset`, schema property names in
//! `crate::storage::schema`.

pub mod node;
pub mod relationship;
pub mod value;
pub mod property_map;
pub mod kind;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::Value;
pub use property_map::PropertyMap;
pub use kind::SynthNodeKind;
