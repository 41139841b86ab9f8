use super::MetadataStore;
use crate::vg::VolumeGroup;
use cachevol_core::{Error, Result, METADATA_FILE_EXTENSION, PRECOMMIT_FILE_EXTENSION};
use cachevol_utils::{promote_atomic, write_atomic};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata store backed by JSON files in one directory.
///
/// `<vg>.json.pre` holds precommitted metadata and `<vg>.json` the committed
/// copy. Both are replaced atomically, and commit is a rename of the former
/// over the latter.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn committed_path(&self, vg_name: &str) -> PathBuf {
        self.dir.join(format!("{vg_name}.{METADATA_FILE_EXTENSION}"))
    }

    fn precommit_path(&self, vg_name: &str) -> PathBuf {
        self.dir.join(format!("{vg_name}.{PRECOMMIT_FILE_EXTENSION}"))
    }

    fn read(path: &Path) -> Result<VolumeGroup> {
        let content =
            fs::read_to_string(path).map_err(|e| Error::file_system(path, "read metadata", e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl MetadataStore for FileMetadataStore {
    fn write(&self, vg: &VolumeGroup) -> Result<()> {
        vg.validate()?;
        let committed = self.committed_path(vg.name());
        if committed.exists() {
            let current = Self::read(&committed)?;
            if current.id() != vg.id() {
                return Err(Error::metadata(
                    vg.name(),
                    "write",
                    format!("on-disk group has a different id ({})", current.id()),
                ));
            }
            if vg.seqno() <= current.seqno() {
                return Err(Error::metadata(
                    vg.name(),
                    "write",
                    format!(
                        "sequence number {} does not advance committed {}",
                        vg.seqno(),
                        current.seqno()
                    ),
                ));
            }
        }

        let json = serde_json::to_vec_pretty(vg)?;
        let path = self.precommit_path(vg.name());
        write_atomic(&path, &json)?;
        tracing::debug!(vg = %vg.name(), seqno = vg.seqno(), path = %path.display(), "precommitted metadata");
        Ok(())
    }

    fn commit(&self, vg: &VolumeGroup) -> Result<()> {
        let staged_path = self.precommit_path(vg.name());
        if !staged_path.exists() {
            return Err(Error::metadata(vg.name(), "commit", "no precommitted metadata"));
        }
        let staged = Self::read(&staged_path)?;
        if staged.seqno() != vg.seqno() || staged.id() != vg.id() {
            return Err(Error::metadata(
                vg.name(),
                "commit",
                format!(
                    "precommitted seqno {} differs from {}",
                    staged.seqno(),
                    vg.seqno()
                ),
            ));
        }

        promote_atomic(&staged_path, &self.committed_path(vg.name()))?;
        tracing::debug!(vg = %vg.name(), seqno = vg.seqno(), "committed metadata");
        Ok(())
    }

    fn load(&self, vg_name: &str) -> Result<VolumeGroup> {
        let path = self.committed_path(vg_name);
        if !path.exists() {
            return Err(Error::metadata(vg_name, "load", "volume group not found"));
        }
        Self::read(&path)
    }

    fn exists(&self, vg_name: &str) -> bool {
        self.committed_path(vg_name).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CacheSettings;
    use cachevol_core::{VgName, VolumeName};
    use tempfile::TempDir;

    fn populated() -> VolumeGroup {
        let mut vg = VolumeGroup::new(&VgName::new("vg0").unwrap());
        vg.create_linear_volume(&VolumeName::new("data").unwrap(), 10, "/dev/sda", 0)
            .unwrap();
        vg.create_cache_pool(
            &VolumeName::new("fast").unwrap(),
            4,
            1,
            "/dev/nvme0n1",
            0,
            CacheSettings::default(),
        )
        .unwrap();
        vg
    }

    #[test]
    fn test_round_trip_through_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(temp_dir.path());
        let mut vg = populated();

        store.create(&mut vg).unwrap();
        let loaded = store.load("vg0").unwrap();

        assert_eq!(loaded, vg);
        assert!(store.exists("vg0"));
        assert!(!temp_dir.path().join("vg0.json.pre").exists());
    }

    #[test]
    fn test_precommit_is_not_authoritative() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(temp_dir.path());
        let mut vg = populated();
        store.create(&mut vg).unwrap();

        let data = vg.lookup("data").unwrap();
        vg.set_visible(data, false).unwrap();
        vg.increment_seqno();
        store.write(&vg).unwrap();

        let loaded = store.load("vg0").unwrap();
        assert_eq!(loaded.seqno(), 1);
        assert!(loaded.volume(data).unwrap().is_visible());

        store.commit(&vg).unwrap();
        let loaded = store.load("vg0").unwrap();
        assert_eq!(loaded.seqno(), 2);
        assert!(!loaded.volume(data).unwrap().is_visible());
    }

    #[test]
    fn test_invalid_graph_never_written() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(temp_dir.path());
        let mut vg = populated();
        store.create(&mut vg).unwrap();

        let data = vg.lookup("data").unwrap();
        vg.insert_layer(data, crate::status::VolumeStatus::CACHE, "_corig")
            .unwrap();
        vg.increment_seqno();

        assert!(matches!(store.write(&vg), Err(Error::InvalidMetadata { .. })));
        assert!(!temp_dir.path().join("vg0.json.pre").exists());
    }
}
