//! Synchronization for the single frame in flight
//!
//! Acquisition waits on nothing and signals `image_available` plus the
//! acquire fence. The submit waits on `image_available` and signals
//! `render_finished`, which presentation waits on. The fence is waited on
//! once per frame before the command buffer is reset.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Timeout for the acquire fence; the frame loop never gives up on it
pub const FENCE_TIMEOUT: u64 = u64::MAX;

/// Host side view of the acquire fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// Unsignaled with no operation queued against it
    Reset,
    /// Handed to a successful acquire, will be signaled
    Pending,
    /// Waited on; must be reset before the next acquire
    Signaled,
}

impl FenceState {
    /// Whether the fence has to be waited on before it can be reset
    ///
    /// True after a frame that acquired an image but never reached its wait.
    pub fn needs_wait_before_reset(self) -> bool {
        self == Self::Pending
    }

    /// State after an acquire that was given the fence succeeded
    pub fn acquired(self) -> VulkanResult<Self> {
        match self {
            Self::Reset => Ok(Self::Pending),
            other => Err(VulkanError::InvalidOperation {
                reason: format!("acquire fence used while {other:?}, reset it first"),
            }),
        }
    }

    /// State after waiting on the fence
    pub fn waited(self) -> VulkanResult<Self> {
        match self {
            Self::Pending => Ok(Self::Signaled),
            other => Err(VulkanError::InvalidOperation {
                reason: format!("waiting on acquire fence while {other:?} would never return"),
            }),
        }
    }
}

/// Semaphores and fence owned by the frame loop
pub struct FrameSync {
    device: Device,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    acquire_fence: vk::Fence,
    fence_state: FenceState,
}

impl FrameSync {
    /// Create both semaphores and an unsignaled acquire fence
    pub fn new(device: Device) -> VulkanResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder();

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(VulkanError::Api)?;
            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(VulkanError::Api(err));
                }
            };
            let acquire_fence = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(err) => {
                    device.destroy_semaphore(render_finished, None);
                    device.destroy_semaphore(image_available, None);
                    return Err(VulkanError::Api(err));
                }
            };

            Ok(Self {
                device,
                image_available,
                render_finished,
                acquire_fence,
                fence_state: FenceState::Reset,
            })
        }
    }

    /// Signaled by acquisition, waited on by the submit
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Signaled by the submit, waited on by presentation
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    /// Current host side fence state
    pub fn fence_state(&self) -> FenceState {
        self.fence_state
    }

    /// Reset the acquire fence and hand it out for the next acquire
    ///
    /// A fence still pending from an aborted frame is waited on first, since
    /// resetting a fence with a queued signal is invalid.
    pub fn prepare_acquire(&mut self) -> VulkanResult<vk::Fence> {
        if self.fence_state.needs_wait_before_reset() {
            log::debug!("Acquire fence still pending from an aborted frame");
            self.wait_acquired()?;
        }
        unsafe {
            self.device
                .reset_fences(&[self.acquire_fence])
                .map_err(VulkanError::Api)?;
        }
        self.fence_state = FenceState::Reset;
        Ok(self.acquire_fence)
    }

    /// Record that an acquire using the fence succeeded
    pub fn mark_acquired(&mut self) -> VulkanResult<()> {
        self.fence_state = self.fence_state.acquired()?;
        Ok(())
    }

    /// Block until the acquire fence is signaled
    pub fn wait_acquired(&mut self) -> VulkanResult<()> {
        let next = self.fence_state.waited()?;
        unsafe {
            self.device
                .wait_for_fences(&[self.acquire_fence], true, FENCE_TIMEOUT)
                .map_err(VulkanError::Api)?;
        }
        self.fence_state = next;
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.acquire_fence, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_frame_cycle() {
        let state = FenceState::Reset;
        assert!(!state.needs_wait_before_reset());

        let state = state.acquired().unwrap();
        assert_eq!(state, FenceState::Pending);
        assert!(state.needs_wait_before_reset());

        let state = state.waited().unwrap();
        assert_eq!(state, FenceState::Signaled);
        assert!(!state.needs_wait_before_reset());
    }

    #[test]
    fn test_acquire_requires_reset() {
        assert!(matches!(
            FenceState::Signaled.acquired(),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            FenceState::Pending.acquired(),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_wait_only_when_pending() {
        // An out-of-date acquire never signals the fence
        assert!(FenceState::Reset.waited().is_err());
        assert!(FenceState::Signaled.waited().is_err());
    }

    #[test]
    fn test_fence_wait_has_no_timeout() {
        assert_eq!(FENCE_TIMEOUT, u64::MAX);
    }
}
