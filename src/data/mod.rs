//! Data acquisition: remote fetch plus source resolution.

pub mod remote;
pub mod resolver;

pub use remote::{HttpSource, RemoteDocument, RemoteSource};
pub use resolver::{Resolution, SourceResolver, SourceWarning};
