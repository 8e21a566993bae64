//! `shelfsync-catalog`: book synchronization ports and orchestration.
//!
//! The listener talks to two narrow collaborator traits supplied at construction:
//! a `MetadataClient` (remote provider) and a `BookStore` (local catalog). Adapters
//! for both live in `shelfsync-infra`.

pub mod listener;
pub mod metadata;
pub mod store;

pub use listener::{SyncError, SyncOutcome, SynchronizationListener};
pub use metadata::{FetchError, MetadataClient};
pub use store::{BookStore, StoreError};
