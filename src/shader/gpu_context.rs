//! Shared GPU context for wgpu resources.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;
use winit::window::Window;

/// Device, queue and the objects needed to create more surfaces later.
///
/// Every pipeline pass and the presenter share this one device, so display
/// textures can be sampled by the presenter without copies.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initialize a GPU context compatible with the given window surface.
    /// If window is None, initializes for headless/offscreen use.
    pub fn new(window: Option<&Arc<Window>>) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match window {
            Some(window) => Some(instance.create_surface(window.clone())?),
            None => None,
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .map_err(|_| anyhow!("Failed to obtain GPU adapter"))?;

        // Headless too: side-by-side sources are twice a view's width.
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Anaglyph Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        let adapter_info = adapter.get_info();
        info!(
            "GPU: {} ({:?}), max texture size {}",
            adapter_info.name,
            adapter_info.backend,
            device.limits().max_texture_dimension_2d
        );

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }

    /// Largest width or height a texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}
