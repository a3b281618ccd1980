use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;

/// Window surface the swapchain presents to
pub struct RenderSurface {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
}

/// Format, present mode and capabilities the swapchain is built from
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl RenderSurface {
    pub fn new(
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
    ) -> Self {
        Self {
            surface,
            surface_loader,
        }
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> bool {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.surface,
            )
        }.unwrap_or(false)
    }

    /// A device can drive this surface when it reports at least one format and one present mode
    pub fn is_adequate(&self, physical_device: vk::PhysicalDevice) -> bool {
        let formats = unsafe {
            self.surface_loader.get_physical_device_surface_formats(physical_device, self.surface)
        }.unwrap_or_default();
        let present_modes = unsafe {
            self.surface_loader.get_physical_device_surface_present_modes(physical_device, self.surface)
        }.unwrap_or_default();
        !formats.is_empty() && !present_modes.is_empty()
    }

    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                self.surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            )
        };

        Ok(SurfaceSupport {
            capabilities,
            format: choose_surface_format(&formats)?,
            present_mode: choose_present_mode(&present_modes),
        })
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Prefers 8-bit BGRA sRGB and falls back to whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_eyre("Surface reports no formats")
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn srgb_format_is_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn mailbox_else_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX,
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO,
        );
    }
}
