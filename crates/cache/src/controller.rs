use crate::context::CacheContext;
use crate::flush::FlushWaitPolicy;
use cachevol_core::Result;
use cachevol_metadata::{VolumeGroup, VolumeId};
use cachevol_utils::VgLockGuard;

/// Entry point for attaching and detaching cache pools
#[derive(Debug)]
pub struct CacheController<'a> {
    pub(crate) ctx: CacheContext<'a>,
    pub(crate) flush: FlushWaitPolicy,
}

impl<'a> CacheController<'a> {
    pub fn new(ctx: CacheContext<'a>) -> Self {
        Self {
            ctx,
            flush: FlushWaitPolicy::default(),
        }
    }

    /// Use `policy` for the flush wait of every detach
    pub fn with_flush_policy(mut self, policy: FlushWaitPolicy) -> Self {
        self.flush = policy;
        self
    }

    pub fn context(&self) -> CacheContext<'a> {
        self.ctx
    }

    pub fn flush_policy(&self) -> &FlushWaitPolicy {
        &self.flush
    }

    /// Run the write, suspend, commit, resume protocol on `vg`
    pub fn commit_and_apply(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        primary: VolumeId,
        extra_resume: &[VolumeId],
    ) -> Result<()> {
        self.ctx
            .commit_protocol()
            .commit_and_apply(lock, vg, primary, extra_resume)
    }
}
