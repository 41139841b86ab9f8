//! Live device mapping for cachevol
//!
//! The cache layer only ever talks to the kernel mapping through two traits:
//! [`DeviceMapper`] (suspend, resume, activate, deactivate) and
//! [`CacheStatusSource`] (policy and dirty-block status of a live cache
//! target). [`SimulatedDeviceMapper`] implements both against an in-process
//! table built from volume group metadata, which is what the tests and the
//! command line front end drive.

pub mod mapper;
pub mod simulated;
pub mod status;
pub mod table;

pub use mapper::DeviceMapper;
pub use simulated::{DeviceOp, SimulatedDeviceMapper};
pub use status::{BlockInfo, CacheStatusSource, PolicyInfo};
pub use table::{dm_name, build_table, dependencies, TableLine, Target};
