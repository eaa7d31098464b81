#![cfg(target_endian = "little")]

//! The type system of the tessera array engine.
//!
//! An array schema describes every stored value with a [`Datatype`] tag.
//! The ten numeric tags map 1:1 onto native Rust types through the
//! [`NativeCellType`] trait, which lets validation code dispatch once on
//! the tag and then run monomorphically. A single scalar of any numeric
//! tag travels as a [`CellValue`].

pub use cell_value::*;
pub use datatype::*;
pub use native::*;

mod cell_value;
mod datatype;
mod native;
