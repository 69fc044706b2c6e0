//! Database module for PostProof Server
//!
//! Contains the Postgres record store and database utilities.

pub mod record;

pub use record::PgRecordStore;
