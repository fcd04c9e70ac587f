//! # cache-intent
//!
//! Declarative caching for Rust: describe what an operation should do with
//! the cache and let the engine turn it into backend calls.
//!
//! ## Features
//!
//! - **Intents, not plumbing:** read-through results, write-through puts and
//!   invalidating removes, combined freely on one operation
//! - **Layered configuration:** operation settings beat policy defaults,
//!   which beat the defaults a backend was registered with
//! - **Stable keys:** templates such as `"{user.id}:{page}"` render
//!   deterministically, fall back to digests for composite values, and stay
//!   within backend key limits
//! - **Backend agnostic:** anything implementing [`CacheBackend`] can be
//!   registered by name
//! - **Fail fast:** bad templates and unknown backends are rejected when an
//!   operation is declared, not on first traffic
//!
//! ## Quick Start
//!
//! ```
//! use cache_intent::{
//!     args::{CallArgs, Signature},
//!     backend::InMemoryBackend,
//!     invocation::CacheResult,
//!     registry::{BackendDefaults, BackendRegistry},
//!     CachePolicy, Error,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cache_intent::Result<()> {
//! // 1. Register a backend
//! let registry = Arc::new(BackendRegistry::new());
//! registry.register("default", InMemoryBackend::new(), BackendDefaults::default())?;
//!
//! // 2. Declare an operation
//! let get_user = CachePolicy::new(registry)
//!     .caching(Signature::new("get_user").param("user_id"))
//!     .result(CacheResult::new(["{user_id}"]).with_namespace(Some("u".to_string())))
//!     .build()?;
//!
//! // 3. Call it: the first call computes, the second is served from "u:42"
//! let args = CallArgs::new().bind("user_id", "42");
//! for _ in 0..2 {
//!     let name = get_user
//!         .call(&args, || async { Ok::<_, Error>(Some("Alice".to_string())) })
//!         .await?;
//!     assert_eq!(name.as_deref(), Some("Alice"));
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod action;
pub mod args;
pub mod backend;
pub mod builder;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod key;
pub mod policy;
pub mod proxy;
pub mod registry;
pub mod serialization;
pub mod setting;
pub mod value;

// Re-exports for convenience
pub use args::{CallArgs, Signature};
pub use backend::CacheBackend;
pub use builder::OperationBuilder;
pub use error::{Error, Result};
pub use executor::Executor;
pub use invocation::{CachePut, CacheRemove, CacheResult, Invocation};
pub use key::{KeyCodec, KeyGenerator};
pub use policy::{CachePolicy, CachedOperation, PolicyDefaults};
pub use registry::{BackendDefaults, BackendRegistry, DEFAULT_BACKEND_NAME};
pub use setting::Setting;
pub use value::KeyValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
