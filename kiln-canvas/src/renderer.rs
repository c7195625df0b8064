//! Drives a recorded [`Canvas`] through the pass executors.
//!
//! Owns the descriptor layouts, one set of host-mapped geometry/param
//! buffers per frame-ring slot, and the three executors. Each `render` call
//! uploads the canvas arrays into the current slot's buffers and replays the
//! pass runs into the frame encoder.

use bytemuck::Pod;
use kiln_gpu::{
    Buffer, BufferBinding, BufferInfo, BufferUsage, DescriptorBindingInfo, DescriptorSet,
    DescriptorSetLayout, DescriptorSetLayoutInfo, DescriptorSetUpdate, DescriptorType, Device,
    Extent2D, Extent3D, Format, ImageAspects, ImageCopy, ImageSubresourceLayers, ImageView,
    Offset2D, Offset3D, PipelineCache, Rect, Result, Shader, WHOLE_SIZE,
};

use crate::canvas::{Canvas, CanvasPassType};
use crate::passes::blur::{BlurMip, BlurPass, BlurPassDesc, BlurPassParams};
use crate::passes::ngon::{NgonPass, NgonPassDesc, NgonPassParams};
use crate::passes::rrect::{RRectPass, RRectPassDesc, RRectPassParams};

const MIN_BUFFER_CAPACITY: u64 = 4096;

#[derive(Debug, Clone)]
pub struct CanvasRendererDesc<'a> {
    pub color_format: Format,
    pub rrect_vertex_shader: Shader,
    pub rrect_fragment_shader: Shader,
    pub ngon_vertex_shader: Shader,
    pub ngon_fragment_shader: Shader,
    pub blur_downsample_vertex_shader: Shader,
    pub blur_downsample_fragment_shader: Shader,
    pub blur_upsample_vertex_shader: Shader,
    pub blur_upsample_fragment_shader: Shader,
    pub cache: Option<&'a PipelineCache>,
}

/// Where a canvas frame lands.
pub struct CanvasTarget<'a> {
    pub color_view: &'a ImageView,
    pub extent: Extent2D,
    /// Pyramid for blur runs; level 0 must match `extent`. Blur runs are
    /// skipped when absent. Blurring snapshots the target through transfer
    /// copies, so the target image and level 0 both need transfer usage.
    pub blur_mips: Option<&'a [BlurMip]>,
}

/// One frame-ring slot's GPU-visible canvas data.
struct FrameArena {
    vertices: Option<Buffer>,
    indices: Option<Buffer>,
    rrect_params: Option<Buffer>,
    ngon_params: Option<Buffer>,
    rrect_set: DescriptorSet,
    ngon_set: DescriptorSet,
}

pub struct CanvasRenderer {
    params_layout: DescriptorSetLayout,
    textures_layout: DescriptorSetLayout,
    rrect_pass: RRectPass,
    ngon_pass: NgonPass,
    blur_pass: BlurPass,
    frames: Vec<FrameArena>,
}

impl CanvasRenderer {
    /// Number of sampled textures addressable from canvas shaders.
    pub const NUM_TEXTURE_SLOTS: u32 = 64;

    pub fn new(device: &mut Device, desc: &CanvasRendererDesc) -> Result<Self> {
        let params_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutInfo {
            label: Some("canvas params ssbo layout"),
            bindings: &[DescriptorBindingInfo {
                ty: DescriptorType::DynamicStorageBuffer,
                count: 1,
                is_variable_length: false,
            }],
        })?;
        let textures_layout = device.create_descriptor_set_layout(&DescriptorSetLayoutInfo {
            label: Some("canvas textures layout"),
            bindings: &[DescriptorBindingInfo {
                ty: DescriptorType::CombinedImageSampler,
                count: Self::NUM_TEXTURE_SLOTS,
                is_variable_length: true,
            }],
        })?;

        let rrect_pass = RRectPass::new(
            device,
            &RRectPassDesc {
                vertex_shader: desc.rrect_vertex_shader.clone(),
                fragment_shader: desc.rrect_fragment_shader.clone(),
                color_format: desc.color_format,
                params_layout: &params_layout,
                textures_layout: &textures_layout,
                cache: desc.cache,
            },
        )?;
        let ngon_pass = NgonPass::new(
            device,
            &NgonPassDesc {
                vertex_shader: desc.ngon_vertex_shader.clone(),
                fragment_shader: desc.ngon_fragment_shader.clone(),
                color_format: desc.color_format,
                params_layout: &params_layout,
                textures_layout: &textures_layout,
                cache: desc.cache,
            },
        )?;
        let blur_pass = BlurPass::new(
            device,
            &BlurPassDesc {
                downsample_vertex_shader: desc.blur_downsample_vertex_shader.clone(),
                downsample_fragment_shader: desc.blur_downsample_fragment_shader.clone(),
                upsample_vertex_shader: desc.blur_upsample_vertex_shader.clone(),
                upsample_fragment_shader: desc.blur_upsample_fragment_shader.clone(),
                color_format: desc.color_format,
                textures_layout: &textures_layout,
                cache: desc.cache,
            },
        )?;

        let buffering = device.get_frame_context().buffering;
        let mut frames = Vec::with_capacity(buffering as usize);
        for _ in 0..buffering {
            frames.push(FrameArena {
                vertices: None,
                indices: None,
                rrect_params: None,
                ngon_params: None,
                rrect_set: device.create_descriptor_set(&params_layout, &[])?,
                ngon_set: device.create_descriptor_set(&params_layout, &[])?,
            });
        }

        Ok(Self {
            params_layout,
            textures_layout,
            rrect_pass,
            ngon_pass,
            blur_pass,
            frames,
        })
    }

    /// Layout the application's texture-array set must be created with.
    pub fn textures_layout(&self) -> &DescriptorSetLayout {
        &self.textures_layout
    }

    pub fn params_layout(&self) -> &DescriptorSetLayout {
        &self.params_layout
    }

    /// Uploads the canvas arrays and records every pass run into the current
    /// frame encoder. Must run between `begin_frame` and `submit_frame`.
    pub fn render(
        &mut self,
        device: &mut Device,
        canvas: &Canvas,
        target: &CanvasTarget,
        textures: &DescriptorSet,
    ) -> Result<()> {
        let slot = device.get_frame_context().ring_index as usize;
        self.upload(device, slot, canvas)?;

        let arena = &self.frames[slot];
        let encoder = device.encoder_mut();

        let mut rrect_cursor = 0u32;
        let mut ngon_cursor = 0usize;
        let mut ngon_first_index = 0u32;
        let mut blur_cursor = 0usize;
        let mut custom_cursor = 0usize;

        for run in &canvas.pass_runs {
            let scissor = clamp_scissor(run.scissor, target.extent);
            match run.ty {
                CanvasPassType::RRect => {
                    let num_instances = run.end - rrect_cursor;
                    self.rrect_pass.add_pass(
                        encoder,
                        &RRectPassParams {
                            color_view: target.color_view,
                            render_extent: target.extent,
                            scissor,
                            first_instance: rrect_cursor,
                            num_instances,
                            params_ssbo: &arena.rrect_set,
                            params_ssbo_offset: 0,
                            textures,
                        },
                    );
                    rrect_cursor = run.end;
                }
                CanvasPassType::Ngon => {
                    let index_counts = &canvas.ngon_index_counts[ngon_cursor..run.end as usize];
                    self.ngon_pass.add_pass(
                        encoder,
                        &NgonPassParams {
                            color_view: target.color_view,
                            render_extent: target.extent,
                            scissor,
                            vertices: arena.vertices.as_ref().expect("ngon run without vertices"),
                            indices: arena.indices.as_ref().expect("ngon run without indices"),
                            first_index: ngon_first_index,
                            index_counts,
                            first_instance: ngon_cursor as u32,
                            params_ssbo: &arena.ngon_set,
                            params_ssbo_offset: 0,
                            textures,
                        },
                    );
                    ngon_first_index += index_counts.iter().sum::<u32>();
                    ngon_cursor = run.end as usize;
                }
                CanvasPassType::Blur => {
                    for param in &canvas.blur_params[blur_cursor..run.end as usize] {
                        self.encode_blur(encoder, target, param.area, param.radius);
                    }
                    blur_cursor = run.end as usize;
                }
                CanvasPassType::Custom => {
                    for pass in &canvas.custom_params[custom_cursor..run.end as usize] {
                        pass(encoder);
                    }
                    custom_cursor = run.end as usize;
                }
                CanvasPassType::None => {}
            }
        }

        Ok(())
    }

    /// Blurs `area` of the target in place: snapshot the target into the
    /// pyramid base, run the Kawase chain, copy the blurred region back.
    fn encode_blur(
        &self,
        encoder: &mut kiln_gpu::CommandEncoder,
        target: &CanvasTarget,
        area: Rect,
        radius: u32,
    ) {
        let Some(mips) = target.blur_mips else {
            log::warn!("blur run skipped: target carries no blur pyramid");
            return;
        };
        if mips.len() < 2 {
            log::warn!("blur run skipped: pyramid needs at least two levels");
            return;
        }
        let area = clamp_scissor(area, target.extent);
        if area.extent.is_zero() {
            return;
        }

        let target_image = target.color_view.image();
        let base_image = mips[0].view.image();
        let full_copy = [ImageCopy {
            src_layers: color_layers(),
            src_offset: Offset3D::default(),
            dst_layers: color_layers(),
            dst_offset: Offset3D::default(),
            extent: Extent3D::new(target.extent.width, target.extent.height, 1),
        }];
        encoder.copy_image(target_image, base_image, &full_copy);

        self.blur_pass
            .add_pass(encoder, &BlurPassParams { mips, radius });

        let region = [ImageCopy {
            src_layers: color_layers(),
            src_offset: Offset3D {
                x: area.offset.x,
                y: area.offset.y,
                z: 0,
            },
            dst_layers: color_layers(),
            dst_offset: Offset3D {
                x: area.offset.x,
                y: area.offset.y,
                z: 0,
            },
            extent: Extent3D::new(area.extent.width, area.extent.height, 1),
        }];
        encoder.copy_image(base_image, target_image, &region);
    }

    fn upload(&mut self, device: &Device, slot: usize, canvas: &Canvas) -> Result<()> {
        let arena = &mut self.frames[slot];
        write_array(
            device,
            &mut arena.vertices,
            canvas.vertices.as_slice(),
            BufferUsage::VERTEX_BUFFER,
            Some("canvas vertices"),
        )?;
        write_array(
            device,
            &mut arena.indices,
            canvas.indices.as_slice(),
            BufferUsage::INDEX_BUFFER,
            Some("canvas indices"),
        )?;

        if write_array(
            device,
            &mut arena.rrect_params,
            canvas.rrect_params.as_slice(),
            BufferUsage::STORAGE_BUFFER,
            Some("canvas rrect params"),
        )? {
            point_params_set(device, &arena.rrect_set, arena.rrect_params.as_ref());
        }
        if write_array(
            device,
            &mut arena.ngon_params,
            canvas.ngon_params.as_slice(),
            BufferUsage::STORAGE_BUFFER,
            Some("canvas ngon params"),
        )? {
            point_params_set(device, &arena.ngon_set, arena.ngon_params.as_ref());
        }
        Ok(())
    }
}

fn color_layers() -> ImageSubresourceLayers {
    ImageSubresourceLayers {
        aspects: ImageAspects::COLOR,
        mip_level: 0,
        first_array_layer: 0,
        num_array_layers: 1,
    }
}

/// Clamps a run scissor (which may carry the everything sentinel) into the
/// target bounds.
fn clamp_scissor(scissor: Rect, extent: Extent2D) -> Rect {
    let x = scissor.offset.x.clamp(0, extent.width as i32);
    let y = scissor.offset.y.clamp(0, extent.height as i32);
    let width = scissor.extent.width.min(extent.width.saturating_sub(x as u32));
    let height = scissor
        .extent
        .height
        .min(extent.height.saturating_sub(y as u32));
    Rect {
        offset: Offset2D { x, y },
        extent: Extent2D { width, height },
    }
}

/// Writes `data` into the slot buffer, growing it geometrically when needed.
/// Returns whether the buffer was (re)created.
fn write_array<T: Pod>(
    device: &Device,
    buffer: &mut Option<Buffer>,
    data: &[T],
    usage: BufferUsage,
    label: kiln_gpu::Label,
) -> Result<bool> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return Ok(false);
    }

    let needed = bytes.len() as u64;
    let grown = match buffer {
        Some(existing) if existing.size() >= needed => false,
        _ => {
            let capacity = needed.next_power_of_two().max(MIN_BUFFER_CAPACITY);
            *buffer = Some(device.create_buffer(&BufferInfo {
                label,
                size: capacity,
                usage,
                host_mapped: true,
            })?);
            true
        }
    };

    let target = buffer.as_ref().expect("buffer just ensured");
    let mapped = device.map_buffer_memory(target)?;
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped, bytes.len());
    }
    device.flush_mapped_buffer_memory(target, 0, WHOLE_SIZE)?;
    Ok(grown)
}

fn point_params_set(device: &Device, set: &DescriptorSet, buffer: Option<&Buffer>) {
    let Some(buffer) = buffer else {
        return;
    };
    device.update_descriptor_set(
        set,
        &DescriptorSetUpdate {
            binding: 0,
            element: 0,
            buffers: &[BufferBinding {
                buffer: Some(buffer.clone()),
                offset: 0,
                size: WHOLE_SIZE,
            }],
            texel_buffers: &[],
            images: &[],
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissors_clamp_into_the_target() {
        let extent = Extent2D::new(1280, 720);
        let clamped = clamp_scissor(crate::canvas::DEFAULT_SCISSOR, extent);
        assert_eq!(clamped.offset, Offset2D { x: 0, y: 0 });
        assert_eq!(clamped.extent, extent);

        let partial = clamp_scissor(
            Rect {
                offset: Offset2D { x: 1200, y: -20 },
                extent: Extent2D::new(400, 100),
            },
            extent,
        );
        assert_eq!(partial.offset, Offset2D { x: 1200, y: 0 });
        assert_eq!(partial.extent, Extent2D::new(80, 100));
    }
}
