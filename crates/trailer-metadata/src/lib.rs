//! Metadata Resolver (C5): translates an external identifier (IMDb id) into
//! a canonical title record — the name, alt titles, runtime and any
//! trailer already catalogued in the metadata DB — that the rest of the
//! resolution engine searches against.

pub mod client;
pub mod error;

pub use client::MetadataClient;
pub use error::{MetadataError, MetadataResult};
