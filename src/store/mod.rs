//! Contracts for the identity and permission collaborators.
//!
//! The pipeline never talks to a database itself. It resolves bearer tokens
//! through [`UserLookup`] and permission sets through [`PermissionLookup`];
//! the server wires in whatever backs them. [`MemoryStore`] is an in-process
//! implementation of both.

mod memory;

use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::identity::{Permissions, User};

pub use memory::MemoryStore;

/// Boxed future returned by store lookups.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Resolve a plaintext bearer token to its user.
pub trait UserLookup: Send + Sync {
    /// `Ok(None)` when no live token matches.
    fn get_for_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<User>>;
}

/// Fetch the permission codes granted to a user.
pub trait PermissionLookup: Send + Sync {
    fn get_all_for_user(&self, user_id: i64) -> StoreFuture<'_, Permissions>;
}
