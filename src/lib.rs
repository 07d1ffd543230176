//! A uniform typed-record storage API over SQLite, MySQL, and MongoDB.
//!
//! Application code declares a record type by implementing [`Record`] and
//! describing its fields via [`RecordDescriptor`], binds it to a live
//! [`Database`] through [`Table`], and from then on only ever calls
//! `find_first`/`find_all`/`count`/`insert_or_update`/`delete_all` —
//! without branching on which backend is actually configured.
//!
//! ```no_run
//! use polystore::{ConfigSection, DatabaseBuilder};
//!
//! # async fn run() -> polystore::Result<()> {
//! let section = ConfigSection::from_pairs([
//!     ("sqlite.enabled", true.into()),
//!     ("sqlite.path", "./data.db".into()),
//! ])?;
//! let database = DatabaseBuilder::build(&section).await?;
//! database.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod field;
pub mod logging;
pub mod query;
pub mod queue;
pub mod record;
pub mod schema;
pub mod table;
pub mod types;
pub mod value;

pub use backend::Driver;
pub use config::{ConfigSection, Section};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use database::{Database, DatabaseBuilder};
pub use error::{Error, Result};
pub use field::{Field, FieldKind, ForeignRef, Size};
pub use query::{Comparator, OrderBy, Query};
pub use record::{PrimaryPool, Record, RecordDescriptor, RecordDescriptorBuilder};
pub use table::Table;
pub use types::{Backend, DataType, Wire};
pub use value::{RecordSection, Value};
