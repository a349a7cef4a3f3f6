//! securestore-server: HTTP edge for the encrypted object store
//!
//! Management routes (buckets, objects, capability keys) sit behind an
//! optional admin bearer token. `/api/download` is public and resolves a
//! capability key before streaming the decrypted object.

pub mod config;
pub mod error;
pub mod ident;
pub mod middleware;
pub mod routes;
pub mod state;
