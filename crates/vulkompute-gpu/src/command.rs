//! Command pool and command buffer management.

use crate::device::{Device, Queue};
use crate::error::{GpuError, Result};
use crate::sync::Fence;
use ash::vk;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Freshly allocated or reset.
    Initial,
    /// Between `begin` and `end`.
    Recording,
    /// Ended and ready to submit.
    Executable,
    /// Submitted and not yet known to have completed.
    Pending,
    /// Completed after a one-time-submit recording; must be reset or re-begun.
    Invalid,
}

impl CommandBufferState {
    /// Whether `begin` is allowed. Beginning an executable or invalid buffer
    /// resets it implicitly.
    pub fn can_begin(self) -> bool {
        matches!(self, Self::Initial | Self::Executable | Self::Invalid)
    }

    /// Whether `end` is allowed.
    pub fn can_end(self) -> bool {
        self == Self::Recording
    }

    /// Whether `submit` is allowed.
    pub fn can_submit(self) -> bool {
        self == Self::Executable
    }

    /// Whether `reset` is allowed.
    pub fn can_reset(self) -> bool {
        self != Self::Pending
    }

    /// State after the submission that put the buffer in `Pending` completes.
    pub fn completed(self, one_time: bool) -> Self {
        match self {
            Self::Pending if one_time => Self::Invalid,
            Self::Pending => Self::Executable,
            other => other,
        }
    }
}

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
    device: Arc<Device>,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset and re-recorded individually.
    pub fn new(device: Arc<Device>, queue_family: u32) -> Result<Arc<Self>> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.raw().create_command_pool(&create_info, None)? };

        Ok(Arc::new(Self {
            pool,
            queue_family,
            device,
        }))
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    pub fn allocate(self: &Arc<Self>) -> Result<CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.raw().allocate_command_buffers(&alloc_info)? };
        let handle = buffers.into_iter().next().ok_or_else(|| {
            GpuError::InvalidState("Driver returned no command buffer".to_string())
        })?;

        Ok(CommandBuffer {
            handle,
            state: Cell::new(CommandBufferState::Initial),
            one_time: Cell::new(false),
            fence: Cell::new(vk::Fence::null()),
            pool: Arc::clone(self),
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_command_pool(self.pool, None);
        }
    }
}

/// A primary command buffer with tracked state.
///
/// State lives in a `Cell`, so a buffer can be shared by reference while
/// recording but never across threads.
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    state: Cell<CommandBufferState>,
    one_time: Cell<bool>,
    /// Fence passed to the last `submit`, null if none.
    fence: Cell<vk::Fence>,
    pool: Arc<CommandPool>,
}

impl CommandBuffer {
    /// Get the raw command buffer handle.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Current state.
    pub fn state(&self) -> CommandBufferState {
        self.state.get()
    }

    /// Whether commands can be recorded right now.
    pub fn is_recording(&self) -> bool {
        self.state() == CommandBufferState::Recording
    }

    pub(crate) fn device(&self) -> &ash::Device {
        self.pool.device.raw()
    }

    /// Begin recording.
    pub fn begin(&self, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        self.check("begin", CommandBufferState::can_begin)?;

        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device().begin_command_buffer(self.handle, &begin_info)? };

        self.one_time
            .set(flags.contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT));
        self.state.set(CommandBufferState::Recording);
        Ok(())
    }

    /// End recording.
    pub fn end(&self) -> Result<()> {
        self.check("end", CommandBufferState::can_end)?;

        let ended = unsafe { self.device().end_command_buffer(self.handle) };
        // A failed end leaves the buffer invalid
        self.state.set(if ended.is_ok() {
            CommandBufferState::Executable
        } else {
            CommandBufferState::Invalid
        });
        ended?;
        Ok(())
    }

    /// Reset to `Initial`.
    pub fn reset(&self) -> Result<()> {
        self.check("reset", CommandBufferState::can_reset)?;

        unsafe {
            self.device()
                .reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())?;
        }
        self.state.set(CommandBufferState::Initial);
        Ok(())
    }

    /// Submit to `queue`, optionally signaling `fence`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn submit(&self, queue: Queue, fence: Option<&Fence>) -> Result<()> {
        self.check("submit", CommandBufferState::can_submit)?;

        let command_buffers = [self.handle];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let fence = fence.map_or(vk::Fence::null(), Fence::handle);

        unsafe {
            self.device()
                .queue_submit(queue.handle, &[submit_info], fence)
                .map_err(GpuError::CommandSubmission)?;
        }
        self.fence.set(fence);
        self.state.set(CommandBufferState::Pending);
        Ok(())
    }

    /// Wait on `fence` for the pending submission of this buffer.
    ///
    /// Fails with `InvalidState` unless the buffer is pending on exactly
    /// `fence`.
    pub(crate) fn wait_for(&self, fence: &Fence) -> Result<()> {
        if self.state() != CommandBufferState::Pending {
            return Err(self.wrong_state("wait on"));
        }
        check_fence(self.fence.get(), fence.handle())?;
        fence.wait()?;
        self.mark_complete();
        Ok(())
    }

    /// Record that the last submission has finished executing.
    pub(crate) fn mark_complete(&self) {
        self.state.set(self.state().completed(self.one_time.get()));
    }

    /// Fail unless the buffer is recording.
    pub(crate) fn ensure_recording(&self) -> Result<()> {
        if self.is_recording() {
            Ok(())
        } else {
            Err(self.wrong_state("record into"))
        }
    }

    fn check(&self, op: &str, allowed: fn(CommandBufferState) -> bool) -> Result<()> {
        if allowed(self.state()) {
            Ok(())
        } else {
            Err(self.wrong_state(op))
        }
    }

    fn wrong_state(&self, op: &str) -> GpuError {
        GpuError::InvalidState(format!(
            "Cannot {op} a command buffer in the {:?} state",
            self.state()
        ))
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.state() == CommandBufferState::Pending {
            // Freeing a pending buffer is undefined behavior
            let _ = self.pool.device.wait_idle();
        }
        unsafe {
            self.device()
                .free_command_buffers(self.pool.handle(), &[self.handle]);
        }
    }
}

/// Fail unless `waited` is the fence a submission was given.
pub(crate) fn check_fence(submitted: vk::Fence, waited: vk::Fence) -> Result<()> {
    if submitted == vk::Fence::null() {
        Err(GpuError::InvalidState("Command buffer was submitted without a fence".to_string()))
    } else if submitted != waited {
        Err(GpuError::InvalidState(format!(
            "Command buffer was submitted with fence {submitted:?}, not {waited:?}"
        )))
    } else {
        Ok(())
    }
}

/// Record, submit and drain a single-use command buffer.
///
/// The buffer is allocated from `pool`, begun with `ONE_TIME_SUBMIT`, filled by
/// `record`, submitted alone to `queue`, and freed after the queue is idle. If
/// `record` fails nothing is submitted.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn execute_one_shot<F, R>(pool: &Arc<CommandPool>, queue: Queue, record: F) -> Result<R>
where
    F: FnOnce(&CommandBuffer) -> Result<R>,
{
    let start = Instant::now();
    let cmd = pool.allocate()?;

    cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    let output = record(&cmd)?;
    cmd.end()?;

    cmd.submit(queue, None)?;
    unsafe {
        cmd.device()
            .queue_wait_idle(queue.handle)
            .map_err(GpuError::CommandSubmission)?;
    }
    cmd.mark_complete();

    tracing::debug!("One-shot submission drained in {:?}", start.elapsed());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::CommandBufferState::*;
    use super::*;
    use ash::vk::Handle;

    const ALL: [CommandBufferState; 5] = [Initial, Recording, Executable, Pending, Invalid];

    #[test]
    fn only_recording_buffers_can_end() {
        for state in ALL {
            assert_eq!(state.can_end(), state == Recording, "{state:?}");
        }
    }

    #[test]
    fn begin_rejects_recording_and_pending() {
        assert!(Initial.can_begin());
        assert!(Executable.can_begin());
        assert!(Invalid.can_begin());
        assert!(!Recording.can_begin());
        assert!(!Pending.can_begin());
    }

    #[test]
    fn only_executable_buffers_submit() {
        for state in ALL {
            assert_eq!(state.can_submit(), state == Executable, "{state:?}");
        }
    }

    #[test]
    fn pending_buffers_cannot_reset() {
        for state in ALL {
            assert_eq!(state.can_reset(), state != Pending, "{state:?}");
        }
    }

    #[test]
    fn completion_depends_on_one_time_submit() {
        assert_eq!(Pending.completed(true), Invalid);
        assert_eq!(Pending.completed(false), Executable);
    }

    #[test]
    fn completion_leaves_other_states_alone() {
        for state in [Initial, Recording, Executable, Invalid] {
            assert_eq!(state.completed(true), state);
            assert_eq!(state.completed(false), state);
        }
    }

    #[test]
    fn typical_cycle() {
        // begin -> end -> submit -> wait -> begin again
        let mut state = Initial;
        assert!(state.can_begin());
        state = Recording;
        assert!(state.can_end());
        state = Executable;
        assert!(state.can_submit());
        state = Pending;
        state = state.completed(false);
        assert!(state.can_submit());
        assert!(state.can_begin());
    }

    #[test]
    fn waiting_needs_the_submitted_fence() {
        let submitted = vk::Fence::from_raw(1);
        let other = vk::Fence::from_raw(2);
        check_fence(submitted, submitted).unwrap();
        assert!(matches!(
            check_fence(submitted, other),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn waiting_on_an_unfenced_submission_fails() {
        assert!(matches!(
            check_fence(vk::Fence::null(), vk::Fence::from_raw(1)),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            check_fence(vk::Fence::null(), vk::Fence::null()),
            Err(GpuError::InvalidState(_))
        ));
    }
}
