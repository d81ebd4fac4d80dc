// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::mem::{offset_of, size_of};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use lumen_render::UiVertex;
use tracing::{debug, info};

use crate::device::GpuDevice;
use crate::handle::Owned;

pub const TRIANGLE_VERT: &str = "triangle.vert.spv";
pub const TRIANGLE_FRAG: &str = "triangle.frag.spv";
pub const UI_VERT: &str = "ui.vert.spv";
pub const UI_FRAG: &str = "ui.frag.spv";

/// Everything needed to build one graphics pipeline.
///
/// The builder copies these blocks into the create call as they are; nothing
/// is filled in for the caller.
#[derive(Clone, Debug)]
pub struct PipelineDescriptor {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    /// Viewport and scissor count; their values are dynamic state.
    pub viewport_count: u32,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub color_blend_logic_op: Option<vk::LogicOp>,
    pub blend_constants: [f32; 4],
    pub depth_stencil: Option<vk::PipelineDepthStencilStateCreateInfo<'static>>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl PipelineDescriptor {
    /// Hard-coded triangle: no vertex input, back faces culled.
    pub fn triangle(
        shader_dir: &Path,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Self {
        Self {
            vertex_shader: shader_dir.join(TRIANGLE_VERT),
            fragment_shader: shader_dir.join(TRIANGLE_FRAG),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            input_assembly: triangle_list(),
            viewport_count: 1,
            rasterization: fill(vk::CullModeFlags::BACK),
            multisample: single_sample(),
            color_blend_attachments: vec![opaque_write()],
            color_blend_logic_op: None,
            blend_constants: [0.0; 4],
            depth_stencil: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            layout,
            render_pass,
            subpass: 0,
        }
    }

    /// Overlay boxes: one interleaved `UiVertex` binding, no culling.
    pub fn ui_overlay(
        shader_dir: &Path,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Self {
        Self {
            vertex_shader: shader_dir.join(UI_VERT),
            fragment_shader: shader_dir.join(UI_FRAG),
            vertex_bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: size_of::<UiVertex>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vertex_attributes: vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(UiVertex, position) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: offset_of!(UiVertex, color) as u32,
                },
            ],
            rasterization: fill(vk::CullModeFlags::NONE),
            ..Self::triangle(shader_dir, layout, render_pass)
        }
    }
}

fn triangle_list() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false)
}

fn fill(cull: vk::CullModeFlags) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

fn single_sample() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false)
        .min_sample_shading(1.0)
}

fn opaque_write() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ZERO)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Turns descriptors into pipeline objects. Shared by the scene and the UI
/// overlay.
pub struct PipelineBuilder<D: GpuDevice> {
    device: Arc<D>,
}

impl<D: GpuDevice> PipelineBuilder<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self { device }
    }

    /// Empty layout: no descriptor sets, no push constants.
    pub fn create_layout(&self) -> Result<Owned<D, vk::PipelineLayout>> {
        let info = vk::PipelineLayoutCreateInfo::default();
        let layout = unsafe { self.device.create_pipeline_layout(&info) }
            .context("vkCreatePipelineLayout")?;
        Ok(Owned::new(Arc::clone(&self.device), layout))
    }

    pub fn create_pipeline(&self, desc: &PipelineDescriptor) -> Result<Owned<D, vk::Pipeline>> {
        // Modules only live for the create call; their guards drop on return.
        let vertex = self.load_shader(&desc.vertex_shader)?;
        let fragment = self.load_shader(&desc.fragment_shader)?;

        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex.raw())
                .name(entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.raw())
                .name(entry),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(desc.viewport_count)
            .scissor_count(desc.viewport_count);
        let mut color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&desc.color_blend_attachments)
            .blend_constants(desc.blend_constants);
        if let Some(op) = desc.color_blend_logic_op {
            color_blend = color_blend.logic_op_enable(true).logic_op(op);
        }
        let dynamic = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&desc.dynamic_states);

        let mut info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&desc.input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&desc.rasterization)
            .multisample_state(&desc.multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .base_pipeline_index(-1);
        if let Some(depth_stencil) = desc.depth_stencil.as_ref() {
            info = info.depth_stencil_state(depth_stencil);
        }

        let pipeline = unsafe { self.device.create_graphics_pipeline(&info) }
            .with_context(|| {
                format!(
                    "vkCreateGraphicsPipelines ({})",
                    desc.vertex_shader.display()
                )
            })?;
        info!(
            "pipeline built from {} + {}",
            desc.vertex_shader.display(),
            desc.fragment_shader.display()
        );
        Ok(Owned::new(Arc::clone(&self.device), pipeline))
    }

    pub fn destroy_pipeline(&self, pipeline: Owned<D, vk::Pipeline>) {
        debug!("destroying pipeline {:?}", pipeline.raw());
        drop(pipeline);
    }

    fn load_shader(&self, path: &Path) -> Result<Owned<D, vk::ShaderModule>> {
        let bytes = lumen_core::read_file(path)?;
        let code = read_spv(&mut Cursor::new(&bytes))
            .with_context(|| format!("{} is not SPIR-V", path.display()))?;
        let module = unsafe { self.device.create_shader_module(&code) }
            .with_context(|| format!("vkCreateShaderModule ({})", path.display()))?;
        Ok(Owned::new(Arc::clone(&self.device), module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{shader_dir, Call, FakeDevice};
    use ash::vk::Handle;
    use lumen_core::LoadError;

    fn targets() -> (vk::PipelineLayout, vk::RenderPass) {
        (vk::PipelineLayout::from_raw(0xB0), vk::RenderPass::from_raw(0xB1))
    }

    #[test]
    fn builds_and_drops_shader_modules() {
        let device = FakeDevice::new();
        let dir = shader_dir();
        let (layout, pass) = targets();
        let builder = PipelineBuilder::new(Arc::clone(&device));

        let pipeline = builder
            .create_pipeline(&PipelineDescriptor::triangle(dir.path(), layout, pass))
            .unwrap();

        assert_eq!(device.live_of("shader_module"), 0);
        assert_eq!(device.live_of("pipeline"), 1);
        assert!(device.calls().contains(&Call::CreatePipeline {
            stages: 2,
            dynamic_states: 2
        }));

        builder.destroy_pipeline(pipeline);
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn one_builder_serves_several_pipelines() {
        let device = FakeDevice::new();
        let dir = shader_dir();
        let builder = PipelineBuilder::new(Arc::clone(&device));
        let layout = builder.create_layout().unwrap();
        let (_, pass) = targets();

        let scene = builder
            .create_pipeline(&PipelineDescriptor::triangle(dir.path(), layout.raw(), pass))
            .unwrap();
        let ui = builder
            .create_pipeline(&PipelineDescriptor::ui_overlay(dir.path(), layout.raw(), pass))
            .unwrap();
        assert_ne!(scene.raw(), ui.raw());
        assert_eq!(device.live_of("pipeline"), 2);
    }

    #[test]
    fn missing_shader_is_a_load_error() {
        let device = FakeDevice::new();
        let dir = tempfile::tempdir().unwrap();
        let (layout, pass) = targets();
        let builder = PipelineBuilder::new(Arc::clone(&device));

        let err = builder
            .create_pipeline(&PipelineDescriptor::triangle(dir.path(), layout, pass))
            .unwrap_err();
        let load = err.downcast_ref::<LoadError>().unwrap();
        assert!(load.path.ends_with(TRIANGLE_VERT));
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn garbage_shader_is_rejected_and_nothing_leaks() {
        let device = FakeDevice::new();
        let dir = shader_dir();
        std::fs::write(dir.path().join(TRIANGLE_FRAG), b"not spirv!").unwrap();
        let (layout, pass) = targets();
        let builder = PipelineBuilder::new(Arc::clone(&device));

        let err = builder
            .create_pipeline(&PipelineDescriptor::triangle(dir.path(), layout, pass))
            .unwrap_err();
        assert!(format!("{err:#}").contains("is not SPIR-V"));
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.invalid_destroys(), 0);
    }

    #[test]
    fn ui_descriptor_matches_vertex_layout() {
        let (layout, pass) = targets();
        let desc = PipelineDescriptor::ui_overlay(Path::new("shaders"), layout, pass);

        assert_eq!(desc.vertex_bindings[0].stride, 20);
        assert_eq!(desc.vertex_attributes[0].offset, 0);
        assert_eq!(desc.vertex_attributes[1].offset, 8);
        assert_eq!(desc.rasterization.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(desc.vertex_shader, Path::new("shaders").join(UI_VERT));
        assert_eq!(desc.dynamic_states.len(), 2);
    }
}
