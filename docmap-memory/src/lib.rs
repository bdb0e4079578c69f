//! In-memory storage for docmap records.
//!
//! This crate provides a thread-safe store that keeps mapped documents in memory and
//! acts as the [`docmap_core::backend::ReferenceResolver`] of its own mapper. It is
//! meant for tests, examples and small embedded uses.
//!
//! # Features
//!
//! - **Identity generation** - ObjectId, hex string and UUID identities are assigned on save
//! - **Reference resolution** - Eager, lazy and auto-stored references resolve against the store
//! - **Access policy** - Per-type vetoes exercise the mapper's veto handling
//! - **Optimistic versioning** - Version fields are checked and incremented on save
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::prelude::*;
//! use docmap::memory::InMemoryStore;
//!
//! let store = InMemoryStore::builder().build();
//! let mut user = User { id: None, name: "Alice".into() };
//! let id = store.insert(&mut user)?;
//! let loaded: User = store.find_by_id(id)?.expect("stored");
//! ```

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
