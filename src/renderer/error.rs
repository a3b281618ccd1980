use std::path::PathBuf;
use ash::vk;
use thiserror::Error;

/// Error kinds that callers may want to tell apart from a plain fatal report
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    #[error("Mesh {mesh} of model {model:?} has no diffuse texture")]
    MissingDiffuseTexture {
        model: PathBuf,
        mesh: usize,
    },
    #[error("Descriptor set table has no entry {0}")]
    DescriptorTableIndex(usize),
}

/// Result of asking the swapchain for the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    Ready {
        image_index: u32,
        suboptimal: bool,
    },
    /// The surface no longer matches the swapchain and the frame must be skipped
    OutOfDate,
}

/// Status reported by presentation. Only `Optimal` leaves the render target untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl SurfaceStatus {
    pub fn is_stale(self) -> bool {
        !matches!(self, SurfaceStatus::Optimal)
    }
}

/// Maps an acquire result onto the in-band status, leaving every other code fatal
pub fn classify_acquire(result: ash::prelude::VkResult<(u32, bool)>) -> Result<AcquiredImage, vk::Result> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquiredImage::Ready { image_index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
        Err(err) => Err(err),
    }
}

/// Maps a present result onto the in-band status, leaving every other code fatal
pub fn classify_present(result: ash::prelude::VkResult<bool>) -> Result<SurfaceStatus, vk::Result> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Optimal),
        Ok(true) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_acquire_is_not_an_error() {
        let outcome = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(outcome, Ok(AcquiredImage::OutOfDate));
    }

    #[test]
    fn suboptimal_acquire_still_yields_an_image() {
        let outcome = classify_acquire(Ok((2, true)));
        assert_eq!(outcome, Ok(AcquiredImage::Ready { image_index: 2, suboptimal: true }));
    }

    #[test]
    fn device_lost_stays_fatal() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST),
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR),
        );
    }

    #[test]
    fn present_statuses() {
        assert_eq!(classify_present(Ok(false)), Ok(SurfaceStatus::Optimal));
        assert_eq!(classify_present(Ok(true)), Ok(SurfaceStatus::Suboptimal));
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(SurfaceStatus::OutOfDate),
        );
        assert!(!SurfaceStatus::Optimal.is_stale());
        assert!(SurfaceStatus::Suboptimal.is_stale());
    }
}
