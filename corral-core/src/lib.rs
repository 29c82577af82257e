pub mod collection;
pub mod error;
pub mod graph;
pub mod logger;
pub mod package;
pub mod run;
pub mod throttle;
pub mod workspace;

mod filter;
#[cfg(test)]
mod testutil;

pub use collection::{AbortHandle, CancelSignal, Concurrency, Discipline, PackageCollection};
pub use error::CorralError;
pub use graph::{DEPENDENCY_KINDS, DependencyKind, Edge, PackageNode};
pub use package::{Manifest, PackageManager, PackageRecord, WorkspacesField};
pub use throttle::AsyncThrottle;
pub use workspace::Workspace;

pub type Result<T> = std::result::Result<T, CorralError>;
