//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ProviderAdapter`: Upstream price / dominance / snapshot / network data
//! - `CacheStore`: A single byte-level cache tier (Redis, in-process)
//! - `ArchiveRepository`: Historical archival of resolved values

pub mod cache_store;
pub mod provider;
pub mod repository;
