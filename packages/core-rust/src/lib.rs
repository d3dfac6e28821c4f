//! Flatmap core: schema model and AsSingle fixup for flattened attribute state.
//!
//! Resource state is stored as a flat map of dotted keys. Lists capped at one
//! item and flagged AsSingle have two encodings: the canonical single-item
//! list (`a.# = 1`, `a.0 = v`) and the collapsed form legacy consumers expect
//! (`a = v`). [`fixup_in`] and [`fixup_out`] convert between them, driven by a
//! [`Schema`].

pub mod error;
pub mod fixup;
pub mod flatmap;
pub mod schema;
pub mod state;
pub mod walker;

mod collapse;
mod expand;

pub use error::{FixupError, SchemaError};
pub use fixup::{fixup_in, fixup_out, Direction, Fixup, FixupConfig, FixupReport};
pub use flatmap::FlatAttributes;
pub use schema::{CountMarker, FieldShape, Schema, SchemaNode};
pub use state::InstanceState;
pub use walker::{FieldPath, SchemaWalker, Visit, WalkOrder};
