use cachevol_metadata::{Volume, VolumeGroup, VolumeStatus};

/// Two-letter attribute column: type then visibility
fn attrs(volume: &Volume) -> String {
    let status = volume.status();
    let kind = if status.contains(VolumeStatus::CACHE) {
        'C'
    } else if status.contains(VolumeStatus::CACHE_POOL) {
        'p'
    } else if status.intersects(VolumeStatus::CACHE_POOL_DATA | VolumeStatus::CACHE_POOL_METADATA)
    {
        'e'
    } else {
        '-'
    };
    let visibility = if volume.is_visible() { '-' } else { 'h' };
    format!("{kind}{visibility}")
}

fn display_name(volume: &Volume) -> String {
    if volume.is_visible() {
        volume.name().to_string()
    } else {
        format!("[{}]", volume.name())
    }
}

pub fn print_volumes(vg: &VolumeGroup) {
    println!("VG {} (seqno {})", vg.name(), vg.seqno());
    if vg.volumes().next().is_none() {
        println!("  no volumes");
        return;
    }

    println!(
        "  {:<20} {:<4} {:>8}  {:<12} {}",
        "LV", "Attr", "Extents", "Type", "Pool/Origin"
    );
    for volume in vg.volumes() {
        let segments = vg.segments_of(volume.id()).unwrap_or_default();
        let types: Vec<&str> = segments.iter().map(|s| s.segtype().name()).collect();
        let link = segments
            .first()
            .filter(|s| s.segtype().is_cache())
            .map(|s| {
                let pool = s.pool().map(|p| vg.volume_name(p)).unwrap_or_default();
                let origin = s.sub_volume(0).map(|o| vg.volume_name(o)).unwrap_or_default();
                format!("{pool}/{origin}")
            })
            .unwrap_or_default();
        println!(
            "  {:<20} {:<4} {:>8}  {:<12} {}",
            display_name(volume),
            attrs(volume),
            vg.extent_count(volume.id()),
            types.join(","),
            link
        );
    }
}
