//! Array schema types for the tessera array engine.
//!
//! An [`ArraySchema`] couples a [`Domain`] (ordered, typed
//! [`Dimension`]s) with the [`Attribute`]s stored per cell. Schemas are
//! built once and then shared immutably by every query that references
//! them.

pub use attribute::*;
pub use dimension::*;
pub use domain::*;
pub use schema::*;

mod attribute;
mod dimension;
mod domain;
mod schema;
