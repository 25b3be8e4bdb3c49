//! Release packages and their dependency graph.
//!
//! Packages live in an arena and refer to each other by [`PackageId`].
//! Inserting a package whose fingerprint is already present returns the
//! existing id, so a package shared by several jobs appears once.

use crate::error::{CoreError, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Index of a package in a [`PackageGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(usize);

impl PackageId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A source package from a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Content-derived identity, used as the compiled version.
    pub fingerprint: String,
    /// SHA1 of the source archive.
    pub sha1: String,
    /// Local path of the source archive.
    pub archive_path: PathBuf,
    dependencies: Vec<PackageId>,
}

impl Package {
    /// A package with no dependencies yet.
    pub fn new(
        name: impl Into<String>,
        fingerprint: impl Into<String>,
        sha1: impl Into<String>,
        archive_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            fingerprint: fingerprint.into(),
            sha1: sha1.into(),
            archive_path: archive_path.into(),
            dependencies: Vec::new(),
        }
    }

    /// Immediate dependencies, in the order they were added.
    pub fn dependencies(&self) -> &[PackageId] {
        &self.dependencies
    }
}

/// A release job and the packages it needs directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseJob {
    /// Job name.
    pub name: String,
    /// Packages the job uses.
    pub packages: Vec<PackageId>,
}

/// Arena of packages with dependency edges.
#[derive(Debug, Default)]
pub struct PackageGraph {
    packages: Vec<Package>,
    by_fingerprint: HashMap<String, PackageId>,
}

impl PackageGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, or return the id of the one with the same fingerprint.
    pub fn insert(&mut self, package: Package) -> PackageId {
        if let Some(id) = self.by_fingerprint.get(&package.fingerprint) {
            return *id;
        }
        let id = PackageId(self.packages.len());
        self.by_fingerprint.insert(package.fingerprint.clone(), id);
        self.packages.push(package);
        id
    }

    /// Record that `package` depends on `dependency`.
    pub fn add_dependency(&mut self, package: PackageId, dependency: PackageId) -> Result<()> {
        self.check(dependency)?;
        let deps = &mut self
            .packages
            .get_mut(package.0)
            .ok_or(CoreError::UnknownPackage(package.0))?
            .dependencies;
        if !deps.contains(&dependency) {
            deps.push(dependency);
        }
        Ok(())
    }

    /// Look up a package.
    pub fn get(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(id.0)
    }

    /// Look up a package, failing for ids from another graph.
    pub fn package(&self, id: PackageId) -> Result<&Package> {
        self.get(id).ok_or(CoreError::UnknownPackage(id.0))
    }

    /// Id of the package with `fingerprint`.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<PackageId> {
        self.by_fingerprint.get(fingerprint).copied()
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the graph has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Every package reachable from `roots`, dependencies first.
    ///
    /// Packages that become ready at the same time keep insertion order.
    pub fn compile_order(&self, roots: &[PackageId]) -> Result<Vec<PackageId>> {
        for root in roots {
            self.check(*root)?;
        }

        // reachable set
        let mut reachable = BTreeSet::new();
        let mut stack: Vec<PackageId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(self.packages[id.0].dependencies.iter().copied());
            }
        }

        // Kahn's algorithm over the reachable subgraph
        let mut pending: HashMap<PackageId, usize> = HashMap::new();
        let mut dependents: HashMap<PackageId, Vec<PackageId>> = HashMap::new();
        let mut ready = BTreeSet::new();
        for &id in &reachable {
            let deps = &self.packages[id.0].dependencies;
            for &dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
            if deps.is_empty() {
                ready.insert(id);
            } else {
                pending.insert(id, deps.len());
            }
        }

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for dependent in dependents.get(&id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        pending.remove(dependent);
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let mut stuck: Vec<PackageId> = pending.into_keys().collect();
            stuck.sort();
            return Err(CoreError::DependencyCycle {
                packages: stuck
                    .into_iter()
                    .map(|id| self.packages[id.0].name.clone())
                    .collect(),
            });
        }
        Ok(order)
    }

    fn check(&self, id: PackageId) -> Result<()> {
        self.package(id).map(|_| ())
    }
}
