//! Compiling every package a set of release jobs needs.

use crate::compiled::CompiledPackageRef;
use crate::compiler::PackageCompiler;
use crate::error::{Result, ResultExt};
use crate::release::{PackageGraph, PackageId, ReleaseJob};
use std::sync::Arc;

/// Compiles the transitive package closure of release jobs, one package at a
/// time, dependencies first.
pub struct PackageDependencyCompiler {
    compiler: Arc<dyn PackageCompiler>,
}

impl PackageDependencyCompiler {
    /// Create a dependency compiler on top of a single-package compiler.
    pub fn new(compiler: Arc<dyn PackageCompiler>) -> Self {
        Self { compiler }
    }

    /// Compile every package reachable from `jobs`.
    ///
    /// Returns one ref per distinct package, in compile order. Packages
    /// already in the cache are returned without remote work.
    pub async fn compile(
        &self,
        graph: &PackageGraph,
        jobs: &[ReleaseJob],
    ) -> Result<Vec<CompiledPackageRef>> {
        let roots: Vec<PackageId> = jobs
            .iter()
            .flat_map(|job| job.packages.iter().copied())
            .collect();
        let order = graph
            .compile_order(&roots)
            .context("Resolving package dependencies")?;
        tracing::info!(jobs = jobs.len(), packages = order.len(), "Compiling packages");

        let mut compiled = Vec::with_capacity(order.len());
        for id in order {
            let package = graph.package(id)?;
            let record = self
                .compiler
                .compile(graph, id)
                .await
                .context(format!(
                    "Compiling package '{}/{}'",
                    package.name, package.fingerprint
                ))?;
            compiled.push(CompiledPackageRef::new(package, &record));
        }
        Ok(compiled)
    }
}
