//! Input and output slots — the two concrete endpoint kinds a component
//! owns, as opposed to [`crate::adapter::Adapter`] which sits between them.

pub mod input;
pub mod output;
