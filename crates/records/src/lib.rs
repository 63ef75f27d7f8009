//! Record model and the indexed record store.
//!
//! A record is the authoritative description of one stored entity: its
//! access keys, physical placement (creation time, bucket resolution,
//! format), lifecycle policies, access statistics and client-defined
//! metadata. Records persist in one indexed SQLite table; blobs live
//! elsewhere and the two are kept coherent by the server's reconcilers, not
//! by transactions.

mod db;
pub mod error;
pub mod ident;
mod model;
mod store;

pub use crate::db::Database;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::model::{
    AccessKeys, CompressPolicy, Format, Physical, PolicySet, PolicyWindow, Record, Stats, epoch,
};
pub use crate::store::{RecordStore, SCAN_PAGE_SIZE};
