//! # keel-core
//!
//! Compiles release packages on the bootstrap agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ PackageDependencyCompiler                                │
//! │   jobs ──▶ PackageGraph::compile_order ──▶ [A, B, C]     │
//! └──────────────────────────────────────────────────────────┘
//!                           │ one package at a time
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │ RemotePackageCompiler                                    │
//! │   cache hit? ──yes──▶ cached record                      │
//! │      │ no                                                │
//! │      ▼                                                   │
//! │   dependency refs ─▶ Blobstore::add ─▶ compile_package   │
//! │                                             │            │
//! │                     CompiledPackageRepo ◀───┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use keel_core::*;
//! use std::sync::Arc;
//!
//! # async fn example(agent: Arc<dyn keel_agent::AgentClient>) -> keel_core::Result<()> {
//! let mut graph = PackageGraph::new();
//! let ruby = graph.insert(Package::new("ruby", "fp-ruby", "sha-ruby", "/tmp/ruby.tgz"));
//! let app = graph.insert(Package::new("app", "fp-app", "sha-app", "/tmp/app.tgz"));
//! graph.add_dependency(app, ruby)?;
//!
//! let blobstore = Arc::new(DavBlobstore::new(
//!     "http://10.0.0.6:25250",
//!     std::time::Duration::from_secs(60),
//! )?);
//! let repo = Arc::new(InMemoryCompiledPackageRepo::new());
//! let remote = RemotePackageCompiler::new(blobstore, agent, repo);
//! let compiler = PackageDependencyCompiler::new(Arc::new(remote));
//!
//! let jobs = [ReleaseJob { name: "web".into(), packages: vec![app] }];
//! let compiled = compiler.compile(&graph, &jobs).await?;
//! # Ok(())
//! # }
//! ```

mod blobstore;
mod compiled;
mod compiler;
mod dependency;
mod error;
mod release;

#[cfg(test)]
mod fakes;

pub use blobstore::{Blobstore, DavBlobstore};
pub use compiled::{
    CompiledPackageRecord, CompiledPackageRef, CompiledPackageRepo, InMemoryCompiledPackageRepo,
};
pub use compiler::{PackageCompiler, RemotePackageCompiler};
pub use dependency::PackageDependencyCompiler;
pub use error::{CoreError, Result, ResultExt};
pub use release::{Package, PackageGraph, PackageId, ReleaseJob};
