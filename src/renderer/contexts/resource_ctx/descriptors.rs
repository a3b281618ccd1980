use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::config::{
    RenderConfig, CAMERA_UBO_BINDING, DIFFUSE_SAMPLER_BINDING, MAX_FRAMES_IN_FLIGHT,
    MODEL_UBO_BINDING, UI_INSTANCE_SSBO_BINDING,
};
use crate::renderer::contexts::frame_ctx::slot::{FrameSlot, PerFrame};
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::DescriptorSetLayoutBuilder;
use crate::renderer::contexts::resource_ctx::memory::GpuBuffer;
use crate::renderer::error::RenderError;
use crate::renderer::shader_data::{CameraData, ModelData};

/// Position of an owner's sets in the descriptor set table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetIndex(usize);

impl DescriptorSetIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Append-only table of per-slot descriptor sets shared by cameras, materials and UI instances
#[derive(Default)]
pub struct DescriptorSetTable {
    entries: Vec<PerFrame<vk::DescriptorSet>>,
}

impl DescriptorSetTable {
    /// New entries always land at the current end of the table
    pub fn push(&mut self, sets: PerFrame<vk::DescriptorSet>) -> DescriptorSetIndex {
        let index = DescriptorSetIndex(self.entries.len());
        self.entries.push(sets);
        index
    }

    pub fn get(&self, index: DescriptorSetIndex) -> Result<&PerFrame<vk::DescriptorSet>, RenderError> {
        self.entries
            .get(index.0)
            .ok_or(RenderError::DescriptorTableIndex(index.0))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sets bound for one draw, ordered to match the pipeline layout
    pub fn sets_for_draw(
        &self,
        slot: FrameSlot,
        camera: DescriptorSetIndex,
        material: DescriptorSetIndex,
        ui_instances: DescriptorSetIndex,
    ) -> Result<[vk::DescriptorSet; 3], RenderError> {
        Ok([
            self.get(camera)?[slot],
            self.get(material)?[slot],
            self.get(ui_instances)?[slot],
        ])
    }
}

/// Layouts in pipeline set order
pub struct DescriptorLayouts {
    pub camera: vk::DescriptorSetLayout,
    pub material: vk::DescriptorSetLayout,
    pub ui_instances: vk::DescriptorSetLayout,
}

impl DescriptorLayouts {
    pub fn in_set_order(&self) -> [vk::DescriptorSetLayout; 3] {
        [self.camera, self.material, self.ui_instances]
    }
}

/// Owns the three fixed layouts, the one oversized pool and the set table
pub struct DescriptorManager {
    pub layouts: DescriptorLayouts,
    pub table: DescriptorSetTable,
    pool: vk::DescriptorPool,
    device: Arc<ash::Device>,
}

impl DescriptorManager {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let capacity = RenderConfig::descriptor_pool_capacity();

        let camera = DescriptorSetLayoutBuilder::new()
            .add_binding(
                CAMERA_UBO_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            );
        let material = DescriptorSetLayoutBuilder::new()
            .add_binding(
                MODEL_UBO_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )
            .add_binding(
                DIFFUSE_SAMPLER_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            );
        let ui_instances = DescriptorSetLayoutBuilder::new()
            .add_binding(
                UI_INSTANCE_SSBO_BINDING,
                vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX,
            );

        // Every descriptor type gets the full set capacity so that incremental
        // material discovery never exhausts the pool
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: capacity,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: capacity,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                descriptor_count: capacity,
            },
        ];
        debug_assert!(
            [&camera, &material, &ui_instances]
                .iter()
                .flat_map(|layout| layout.pool_sizes(1))
                .all(|size| pool_sizes.iter().any(|pool| pool.ty == size.ty)),
        );

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };

        // Layouts are created after the pool so that a failure can release everything made so far
        let mut manager = Self {
            layouts: DescriptorLayouts {
                camera: vk::DescriptorSetLayout::null(),
                material: vk::DescriptorSetLayout::null(),
                ui_instances: vk::DescriptorSetLayout::null(),
            },
            table: DescriptorSetTable::default(),
            pool,
            device,
        };
        manager.layouts.camera = camera.build(&manager.device)?;
        manager.layouts.material = material.build(&manager.device)?;
        manager.layouts.ui_instances = ui_instances.build(&manager.device)?;

        Ok(manager)
    }

    /// Binds one camera uniform buffer per slot
    pub fn bind_camera<B: GpuBuffer>(
        &mut self,
        uniforms: &PerFrame<B>,
    ) -> Result<DescriptorSetIndex> {
        let index = self.allocate(self.layouts.camera)?;
        let sets = self.table.get(index)?;
        for slot in FrameSlot::all() {
            let buffer_info = [
                vk::DescriptorBufferInfo::default()
                    .buffer(uniforms[slot].handle())
                    .offset(0)
                    .range(size_of::<CameraData>() as u64),
            ];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(sets[slot])
                    .dst_binding(CAMERA_UBO_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info),
            ];
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(index)
    }

    /// Binds a mesh's model uniforms together with a sampled texture
    pub fn bind_material<B: GpuBuffer>(
        &mut self,
        model_uniforms: &PerFrame<B>,
        texture_view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<DescriptorSetIndex> {
        let index = self.allocate(self.layouts.material)?;
        let sets = self.table.get(index)?;
        for slot in FrameSlot::all() {
            let buffer_info = [
                vk::DescriptorBufferInfo::default()
                    .buffer(model_uniforms[slot].handle())
                    .offset(0)
                    .range(size_of::<ModelData>() as u64),
            ];
            let image_info = [
                vk::DescriptorImageInfo::default()
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .image_view(texture_view)
                    .sampler(sampler),
            ];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(sets[slot])
                    .dst_binding(MODEL_UBO_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(sets[slot])
                    .dst_binding(DIFFUSE_SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info),
            ];
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(index)
    }

    /// Binds the UI instance storage buffers. The range covers every instance matrix and
    /// is bound with a dynamic offset of zero at draw time.
    pub fn bind_ui_instances<B: GpuBuffer>(
        &mut self,
        instances: &PerFrame<B>,
    ) -> Result<DescriptorSetIndex> {
        let index = self.allocate(self.layouts.ui_instances)?;
        let sets = self.table.get(index)?;
        for slot in FrameSlot::all() {
            let buffer_info = [whole_buffer_info(&instances[slot])];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(sets[slot])
                    .dst_binding(UI_INSTANCE_SSBO_BINDING)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC)
                    .buffer_info(&buffer_info),
            ];
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
        Ok(index)
    }

    // The handles enter the table before any binding is written
    fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Result<DescriptorSetIndex> {
        let layouts = [layout; MAX_FRAMES_IN_FLIGHT];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let mut sets = unsafe { self.device.allocate_descriptor_sets(&info)? }.into_iter();
        let per_frame = PerFrame::from_fn(|_| sets.next().unwrap_or_default());
        let index = self.table.push(per_frame);
        log::debug!("Allocated descriptor sets at table index {}", index.0);
        Ok(index)
    }
}

impl Drop for DescriptorManager {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees every set allocated from it
            self.device.destroy_descriptor_pool(self.pool, None);
            for layout in self.layouts.in_set_order() {
                if layout != vk::DescriptorSetLayout::null() {
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
            }
        }
    }
}

/// Descriptor info spanning all of `buffer`, so an instanced draw may index every element
fn whole_buffer_info<B: GpuBuffer>(buffer: &B) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer.handle())
        .offset(0)
        .range(buffer.size())
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use glam::{Mat4, Vec3};
    use super::*;
    use crate::renderer::contexts::resource_ctx::memory::host::HostMemory;
    use crate::renderer::scene::{ui_instance_transform, UiInstances};

    #[test]
    fn ui_instance_range_covers_every_instance() {
        let memory = HostMemory::default();
        let transforms = vec![
            ui_instance_transform(Vec3::new(1.0, 0.5, 0.0)),
            ui_instance_transform(Vec3::new(-1.0, 0.5, 0.0)),
        ];
        let instances = UiInstances::new(&memory, transforms).unwrap();

        for buffer in instances.buffers.iter() {
            let info = whole_buffer_info(buffer);
            assert_eq!(info.offset, 0);
            assert_eq!(info.range, 2 * size_of::<Mat4>() as u64);
        }
    }

    fn sets(base: u64) -> PerFrame<vk::DescriptorSet> {
        PerFrame::from_fn(|slot| vk::DescriptorSet::from_raw(base + slot.index() as u64))
    }

    #[test]
    fn indices_follow_table_length() {
        let mut table = DescriptorSetTable::default();
        let camera = table.push(sets(10));
        let material = table.push(sets(20));

        assert_eq!(camera.index(), 0);
        assert_eq!(material.index(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn draw_sets_come_from_the_current_slot() {
        let mut table = DescriptorSetTable::default();
        let camera = table.push(sets(10));
        let material = table.push(sets(20));
        let ui = table.push(sets(30));

        let slot = FrameSlot::new(1);
        let bound = table.sets_for_draw(slot, camera, material, ui).unwrap();

        assert_eq!(
            bound.map(|set| set.as_raw()),
            [11, 21, 31],
        );
    }

    #[test]
    fn unknown_index_is_reported() {
        let table = DescriptorSetTable::default();
        let err = table.get(DescriptorSetIndex(3)).unwrap_err();
        assert!(matches!(err, RenderError::DescriptorTableIndex(3)));
    }
}
