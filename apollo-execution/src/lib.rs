//! An asynchronous GraphQL execution engine.
//!
//! An [`Executor`] runs requests against a schema and a set of [`Resolvers`]. Every
//! phase of an execution can be observed, or vetoed, by
//! [`Instrumentation`](instrumentation::Instrumentation)s. Data loader lookups are
//! batched per level of the result tree, and operations above a complexity ceiling
//! are rejected before any field is fetched.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![warn(unreachable_pub)]

pub mod json_ext;

pub mod analysis;
mod configuration;
pub mod dataloader;
pub mod error;
pub mod execution;
mod executor;
pub mod graphql;
pub mod instrumentation;
pub mod normalized;
pub mod path;
pub mod resolver;
pub(crate) mod spec;

pub use configuration::Batching;
pub use configuration::Configuration;
pub use configuration::ConfigurationError;
pub use configuration::Limits;
pub use error::ExecutionError;
pub use error::FieldError;
pub use executor::Executor;
pub use executor::ParseAndValidateResult;
pub use graphql::Request;
pub use graphql::Response;
pub use path::ResultPath;
pub use resolver::ResolverContext;
pub use resolver::Resolvers;
