//! In-memory collection: document storage in natural order, index maintenance, index admin.
mod core;
mod index_admin;
mod ops;

pub use core::Collection;
