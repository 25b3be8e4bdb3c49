//! # keel-vm
//!
//! VM and persistent disk lifecycle for a single-instance deployment.
//!
//! [`VmManager`] creates the VM and records it; [`ManagedVm`] drives it
//! through the [`Cloud`] and the agent; [`DiskDeployer`] keeps the VM's
//! persistent disk matching its [`DiskPool`], migrating data to a new disk
//! when the pool's size or properties change.
//!
//! ## Example
//!
//! ```ignore
//! use keel_vm::{DiskPool, Vm};
//!
//! # async fn example(manager: keel_vm::VmManager, pool: DiskPool) -> keel_vm::Result<()> {
//! if let Some(vm) = manager.find_current().await? {
//!     vm.stop().await?;
//!     let disks = vm.update_disks(&pool).await?;
//!     vm.start().await?;
//! }
//! # Ok(())
//! # }
//! ```

mod cloud;
mod disk;
mod error;
mod manager;
mod records;
mod vm;

#[cfg(test)]
mod fakes;

pub use cloud::{Cloud, CloudError, CloudErrorKind, CloudProperties, VmMetadata};
pub use disk::{CloudDiskManager, Disk, DiskDeployer, DiskManager, DiskPool};
pub use error::{Result, ResultExt, VmError};
pub use manager::{VmManager, VmSpec};
pub use records::{
    DiskRecord, DiskRepo, InMemoryDiskRepo, InMemoryStemcellRepo, InMemoryVmRepo, StemcellRepo,
    VmRepo,
};
pub use vm::{ManagedVm, Vm};
