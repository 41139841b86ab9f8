//! Flush-and-wait before a cache pool can be detached
//!
//! [`FlushController::begin`] makes sure the live cache runs the `cleaner`
//! policy, which writes every dirty block back to the origin. After that the
//! controller is a poll-once state machine: each [`poll_once`] reads the
//! dirty-block count a single time. Callers choose how to loop, either with
//! the blocking [`wait_until_clean`] or the tokio based
//! [`wait_until_clean_async`].
//!
//! [`poll_once`]: FlushController::poll_once
//! [`wait_until_clean`]: FlushController::wait_until_clean
//! [`wait_until_clean_async`]: FlushController::wait_until_clean_async

use crate::context::CacheContext;
use cachevol_config::FlushConfig;
use cachevol_core::{Error, Result, CLEANER_POLICY};
use cachevol_metadata::{VolumeGroup, VolumeId};
use cachevol_utils::tracing::flush_progress;
use cachevol_utils::VgLockGuard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Proof that a zero dirty-block count was read for a volume.
///
/// Only [`FlushController::poll_once`] creates these, and detaching a pool
/// consumes one. The token names the group and metadata sequence number the
/// reading was taken against.
#[derive(Debug)]
pub struct Flushed {
    group: Uuid,
    seqno: u64,
    volume: VolumeId,
}

impl Flushed {
    pub fn volume(&self) -> VolumeId {
        self.volume
    }

    /// Fail unless the reading was taken on `vg` as it is now
    pub fn check(&self, vg: &VolumeGroup) -> Result<()> {
        let mismatch = if self.group != vg.id() {
            Some(format!("flush was observed on another volume group ({})", self.group))
        } else if self.seqno != vg.seqno() {
            Some(format!(
                "flush was observed at seqno {}, metadata is now at {}",
                self.seqno,
                vg.seqno()
            ))
        } else {
            None
        };
        match mismatch {
            Some(message) => Err(Error::PoolDetach {
                volume: vg.volume_name(self.volume),
                message,
            }),
            None => Ok(()),
        }
    }
}

/// Outcome of a single dirty-block reading
#[derive(Debug)]
pub enum FlushState {
    Dirty { dirty_blocks: u64 },
    Clean(Flushed),
}

/// Pacing and bounds of the flush wait loops
#[derive(Debug, Clone)]
pub struct FlushWaitPolicy {
    pub interval: Duration,
    /// `None` waits for as long as it takes
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for FlushWaitPolicy {
    fn default() -> Self {
        Self::from(&FlushConfig::default())
    }
}

impl From<&FlushConfig> for FlushWaitPolicy {
    fn from(config: &FlushConfig) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.timeout,
            cancel: None,
        }
    }
}

impl FlushWaitPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop waiting once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[derive(Debug)]
pub struct FlushController<'a> {
    ctx: CacheContext<'a>,
    volume: VolumeId,
    name: String,
    polls: u64,
    cleaner_swapped: bool,
}

impl<'a> FlushController<'a> {
    /// Switch the live cache of `cached` to the cleaner policy.
    ///
    /// If the cleaner is already live nothing is written. Otherwise the cache
    /// segment's policy is replaced (arguments cleared) and committed with
    /// `cached` as primary. If the change never reached the metadata store,
    /// `vg` is restored to its state before the call.
    pub fn begin(
        ctx: CacheContext<'a>,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        cached: VolumeId,
    ) -> Result<Self> {
        lock.check(vg.name())?;
        let volume = vg.volume(cached)?;
        if !volume.is_cache() {
            return Err(Error::not_a_cache_volume(volume.name()));
        }
        let name = volume.name().to_string();

        let live = ctx.status.policy_info(vg, cached)?;
        let mut cleaner_swapped = false;
        if live.name != CLEANER_POLICY {
            let snapshot = vg.clone();
            let seg = vg.first_segment(cached)?.id();
            vg.set_cache_policy(seg, CLEANER_POLICY)?;

            if let Err(e) = ctx
                .commit_protocol()
                .commit_and_apply(lock, vg, cached, &[])
            {
                if e.precedes_metadata_write() {
                    *vg = snapshot;
                }
                return Err(e);
            }
            cleaner_swapped = true;
            tracing::info!(lv = %name, previous = %live.name, "switched cache policy to {CLEANER_POLICY}");
        }

        Ok(Self {
            ctx,
            volume: cached,
            name,
            polls: 0,
            cleaner_swapped,
        })
    }

    /// Read the dirty-block count once
    pub fn poll_once(&mut self, vg: &VolumeGroup) -> Result<FlushState> {
        let info = self.ctx.status.block_info(vg, self.volume)?;
        self.polls += 1;
        if info.dirty_blocks == 0 {
            tracing::debug!(lv = %self.name, polls = self.polls, "cache is clean");
            Ok(FlushState::Clean(Flushed {
                group: vg.id(),
                seqno: vg.seqno(),
                volume: self.volume,
            }))
        } else {
            Ok(FlushState::Dirty {
                dirty_blocks: info.dirty_blocks,
            })
        }
    }

    pub fn volume(&self) -> VolumeId {
        self.volume
    }

    /// Dirty-block readings taken so far
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Whether `begin` had to commit the cleaner policy
    pub fn cleaner_swapped(&self) -> bool {
        self.cleaner_swapped
    }

    /// Block the calling thread until the cache is clean
    pub fn wait_until_clean(
        &mut self,
        vg: &VolumeGroup,
        policy: &FlushWaitPolicy,
    ) -> Result<Flushed> {
        let started = std::time::Instant::now();
        loop {
            let dirty_blocks = match self.poll_once(vg)? {
                FlushState::Clean(flushed) => return Ok(flushed),
                FlushState::Dirty { dirty_blocks } => dirty_blocks,
            };
            self.check_bounds(policy, started.elapsed(), dirty_blocks)?;
            std::thread::sleep(policy.interval);
        }
    }

    /// [`wait_until_clean`](Self::wait_until_clean) on the tokio timer
    pub async fn wait_until_clean_async(
        &mut self,
        vg: &VolumeGroup,
        policy: &FlushWaitPolicy,
    ) -> Result<Flushed> {
        let started = tokio::time::Instant::now();
        loop {
            let dirty_blocks = match self.poll_once(vg)? {
                FlushState::Clean(flushed) => return Ok(flushed),
                FlushState::Dirty { dirty_blocks } => dirty_blocks,
            };
            self.check_bounds(policy, started.elapsed(), dirty_blocks)?;
            tokio::time::sleep(policy.interval).await;
        }
    }

    fn check_bounds(
        &self,
        policy: &FlushWaitPolicy,
        elapsed: Duration,
        dirty_blocks: u64,
    ) -> Result<()> {
        flush_progress(&self.name, dirty_blocks, self.polls);
        if policy.is_cancelled() {
            return Err(Error::FlushCancelled {
                volume: self.name.clone(),
                dirty_blocks,
            });
        }
        match policy.timeout {
            Some(timeout) if elapsed >= timeout => Err(Error::FlushTimedOut {
                volume: self.name.clone(),
                elapsed,
                dirty_blocks,
            }),
            _ => Ok(()),
        }
    }
}
