//! `PostgreSQL` storage adapter for eventvault.
//!
//! The schema lives in the workspace `migrations/` directory and is applied
//! by [`PgAdapter`]'s `connect`.

pub mod pg_adapter;

pub use pg_adapter::PgAdapter;
