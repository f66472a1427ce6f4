//! Miscellaneous common structs used throughout the library.

mod id;
mod routing_table;

pub use id::*;
pub use routing_table::*;
