use cachevol_core::Result;
use cachevol_metadata::{VolumeGroup, VolumeId};

/// Control of the live block-device mapping.
///
/// `suspend` freezes I/O on a volume and, transitively, on everything its live
/// table maps onto. `resume` loads the table described by `vg` (which the
/// caller has just committed) and resumes the volume together with the
/// dependencies that table reaches; devices outside that closure stay as
/// they were. Both are no-ops for inactive volumes.
pub trait DeviceMapper {
    fn activate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()>;

    fn deactivate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()>;

    fn suspend(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()>;

    fn resume(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()>;

    fn is_active(&self, vg: &VolumeGroup, lv: VolumeId) -> bool;
}
