use crate::output;
use crate::Cli;
use cachevol_activation::SimulatedDeviceMapper;
use cachevol_cache::{CacheContext, CacheController, FlushWaitPolicy};
use cachevol_config::{CacheVolConfig, CacheVolConfigBuilder, ConfigLoader, ConfigSource};
use cachevol_core::{VgName, VolumeName};
use cachevol_metadata::{
    CacheMode, CacheSettings, FileMetadataStore, MetadataStore, SegmentTypeRegistry,
    VolumeGroup,
};
use cachevol_utils::VgLock;
use clap::{Subcommand, ValueEnum};
use eyre::WrapErr;
use std::time::Duration;

#[derive(Subcommand)]
pub enum Commands {
    /// List the volumes of the volume group
    Show,

    /// Create an empty volume group
    Vgcreate,

    /// Create a linear volume
    Lvcreate {
        name: String,

        /// Size in extents
        #[arg(long)]
        extents: u64,

        /// Physical volume to allocate from
        #[arg(long, default_value = "/dev/sda")]
        pv: String,

        /// First physical extent to use
        #[arg(long, default_value_t = 0)]
        pe_start: u64,
    },

    /// Create a cache pool with its data and metadata sub-volumes
    Poolcreate {
        name: String,

        #[arg(long)]
        data_extents: u64,

        #[arg(long, default_value_t = 1)]
        metadata_extents: u64,

        #[arg(long, default_value = "/dev/sdb")]
        pv: String,

        #[arg(long, default_value_t = 0)]
        pe_start: u64,

        #[arg(long, value_enum, default_value_t = ModeArg::Writethrough)]
        mode: ModeArg,

        /// Cache policy
        #[arg(long)]
        policy: Option<String>,
    },

    /// Put a cache pool in front of a volume
    Attach {
        #[arg(long)]
        pool: String,

        #[arg(long)]
        origin: String,
    },

    /// Flush a cached volume and detach its pool
    Detach {
        #[arg(long)]
        lv: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Writethrough,
    Writeback,
}

impl From<ModeArg> for CacheMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Writethrough => CacheMode::Writethrough,
            ModeArg::Writeback => CacheMode::Writeback,
        }
    }
}

fn load_config(cli: &Cli) -> eyre::Result<CacheVolConfig> {
    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from(Some(path.as_path())),
        None => ConfigLoader::load(),
    }
    .wrap_err("failed to load configuration")?;

    let mut builder = CacheVolConfigBuilder::from_config(loaded);
    let mut overridden = false;
    if let Some(dir) = &cli.metadata_dir {
        builder = builder.with_metadata_dir(dir.clone());
        overridden = true;
    }
    if let Some(ms) = cli.flush_interval_ms {
        builder = builder.with_poll_interval(Duration::from_millis(ms));
        overridden = true;
    }
    if let Some(secs) = cli.flush_timeout_secs {
        builder = builder.with_flush_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        overridden = true;
    }
    if overridden {
        builder = builder.with_source(ConfigSource::CommandLine);
    }
    Ok(builder.build())
}

pub async fn run(cli: Cli) -> eyre::Result<()> {
    let config = load_config(&cli)?;
    let vg_name = VgName::new(&cli.vg)?;

    std::fs::create_dir_all(&config.metadata_dir).wrap_err_with(|| {
        format!(
            "failed to create metadata directory {}",
            config.metadata_dir.display()
        )
    })?;
    let store = FileMetadataStore::new(&config.metadata_dir);
    let lock = VgLock::acquire_in(&config.metadata_dir, vg_name.as_str())?;

    if let Commands::Vgcreate = cli.command {
        if store.exists(vg_name.as_str()) {
            eyre::bail!("volume group '{vg_name}' already exists");
        }
        let mut vg = VolumeGroup::new(&vg_name);
        store.create(&mut vg)?;
        tracing::info!(vg = %vg_name, "created volume group");
        output::print_volumes(&vg);
        return Ok(());
    }

    let mut vg = store
        .load(vg_name.as_str())
        .wrap_err_with(|| format!("failed to load volume group '{vg_name}'"))?;

    // Nothing is live between invocations; bring the group up the way it was left
    let dm = SimulatedDeviceMapper::new();
    dm.activate_all(&vg)?;

    let registry = SegmentTypeRegistry::builtin();
    let controller = CacheController::new(CacheContext::new(&registry, &store, &dm, &dm))
        .with_flush_policy(FlushWaitPolicy::from(&config.flush));

    match cli.command {
        Commands::Vgcreate | Commands::Show => {}
        Commands::Lvcreate {
            name,
            extents,
            pv,
            pe_start,
        } => {
            vg.create_linear_volume(&VolumeName::new(name)?, extents, &pv, pe_start)?;
            vg.increment_seqno();
            store.write(&vg)?;
            store.commit(&vg)?;
        }
        Commands::Poolcreate {
            name,
            data_extents,
            metadata_extents,
            pv,
            pe_start,
            mode,
            policy,
        } => {
            let mut settings = CacheSettings {
                mode: mode.into(),
                ..CacheSettings::default()
            };
            if let Some(policy) = policy {
                settings.set_policy(policy);
            }
            vg.create_cache_pool(
                &VolumeName::new(name)?,
                data_extents,
                metadata_extents,
                &pv,
                pe_start,
                settings,
            )?;
            vg.increment_seqno();
            store.write(&vg)?;
            store.commit(&vg)?;
        }
        Commands::Attach { pool, origin } => {
            let pool = vg.lookup(&pool)?;
            let origin = vg.lookup(&origin)?;
            controller
                .attach_and_commit(&lock, &mut vg, pool, origin)
                .wrap_err("attach failed")?;
        }
        Commands::Detach { lv } => {
            let cached = vg.lookup(&lv)?;
            let report = controller
                .detach_async(&lock, &mut vg, cached)
                .await
                .wrap_err("detach failed")?;
            tracing::info!(
                lv = %report.volume,
                pool = %report.pool_name,
                removed = %report.removed_layer,
                polls = report.flush_polls,
                cleaner_swapped = report.cleaner_swapped,
                "detach complete"
            );
        }
    }

    output::print_volumes(&vg);
    Ok(())
}
