//! # dagboard-store
//!
//! Client-side mirrors of server state, seeded by an HTTP bulk fetch and kept
//! current by channel events.
//!
//! - [`DagsStore`]: dags, templates, block and pin catalogs, graph mutations
//!   and template drafts
//! - [`PortsStore`]: live port values with server clock correction
//! - [`LogsStore`]: bounded per-dag log history
//! - [`LogArchive`], [`ErrorReports`], [`TablesStore`], [`ConnectionsStore`]:
//!   on-demand server views
//! - [`spawn_resync`]: refresh stores after the channel reconnects
//!
//! Entity ids are canonicalized with [`EntityId`](dagboard_core::EntityId),
//! so numeric and string forms address the same record. Mutations are never
//! applied optimistically.

#![deny(unsafe_code)]

pub mod archive;
pub mod collection;
pub mod connections;
pub mod dags;
pub mod errors;
pub mod init;
pub mod logs;
pub mod page;
pub mod ports;
pub mod resync;
pub mod tables;
pub mod template;

#[cfg(test)]
mod testing;

pub use archive::{ErrorReports, HourFile, HourRef, LogArchive, LogTree};
pub use collection::MirroredCollection;
pub use connections::ConnectionsStore;
pub use dags::{Connection, DagsStore, EdgeRef};
pub use errors::{Result, StoreError};
pub use init::{CollectionState, InitFailed, InitGuard};
pub use logs::{Direction, LogsStore};
pub use page::{MAIN_PAGE, Page, TemplateKey};
pub use ports::{Clock, PortReading, PortValue, PortsStore, format_age, system_clock};
pub use resync::{Refresh, spawn_resync};
pub use tables::{TableData, TablesStore};
pub use template::{Link, NodeGroup, Position, TemplateDraft, TemplateGraph, TemplateNode};
