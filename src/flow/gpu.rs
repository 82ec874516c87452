//! GPU flow backend using wgpu compute shaders
//!
//! Each tick is three dispatches over the whole grid (levels, emit, absorb),
//! each in its own compute pass so one finishes before the next reads its
//! output. `tick_n` uploads once, encodes up to `batch` ticks per submission
//! and reads the water grid back at the end.

use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use wgpu::util::DeviceExt;

use crate::error::{Result, TerrainError};
use crate::heightfield::{HeightField, EPSILON};

use super::{FlowBackend, TickStats};

const WORKGROUP_SIDE: u32 = 8;

/// Uniform block shared by all three entry points
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GpuFlowParams {
    size: u32,
    epsilon: f32,
    _pad: [u32; 2],
}

/// Device state for one grid size
pub struct GpuBackend {
    size: usize,
    batch: usize,
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    levels_pipeline: wgpu::ComputePipeline,
    emit_pipeline: wgpu::ComputePipeline,
    absorb_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    height_buffer: wgpu::Buffer,
    water_buffer: wgpu::Buffer,
    counter_buffer: wgpu::Buffer,
}

impl GpuBackend {
    /// Open a device and allocate buffers for a `size x size` grid.
    /// Returns None if no adapter or device is available.
    pub fn new(size: usize, batch: usize) -> Option<Self> {
        pollster::block_on(Self::new_async(size, batch.max(1)))
    }

    async fn new_async(size: usize, batch: usize) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_name = adapter.get_info().name;
        log::info!("GPU adapter: {}", adapter_name);

        let cell_bytes = (size * size * std::mem::size_of::<f32>()) as u64;
        let mut limits = wgpu::Limits::default();
        if cell_bytes > limits.max_storage_buffer_binding_size as u64 {
            let available = adapter.limits();
            if cell_bytes > available.max_storage_buffer_binding_size as u64 {
                log::warn!("Grid of {} bytes exceeds the adapter's storage binding limit", cell_bytes);
                return None;
            }
            limits.max_storage_buffer_binding_size = available.max_storage_buffer_binding_size;
            limits.max_buffer_size = available.max_buffer_size;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Flow GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .ok()?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Flow Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(FLOW_SHADER)),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Flow Bind Group Layout"),
            entries: &[
                // heights
                storage(0, true),
                // water
                storage(1, false),
                // levels snapshot
                storage(2, false),
                // outgoing shares
                storage(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // [moving cells, clamped cells]
                storage(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Flow Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let levels_pipeline = pipeline("Flow Levels Pipeline", "levels_main");
        let emit_pipeline = pipeline("Flow Emit Pipeline", "emit_main");
        let absorb_pipeline = pipeline("Flow Absorb Pipeline", "absorb_main");

        let grid_buffer = |label: &str, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: cell_bytes,
                usage,
                mapped_at_creation: false,
            })
        };
        let height_buffer = grid_buffer("Height Buffer", wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST);
        let water_buffer = grid_buffer(
            "Water Buffer",
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let level_buffer = grid_buffer("Level Buffer", wgpu::BufferUsages::STORAGE);
        let share_buffer = grid_buffer("Share Buffer", wgpu::BufferUsages::STORAGE);

        let counter_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Counter Buffer"),
            contents: bytemuck::cast_slice(&[0u32; 2]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        });

        let gpu_params = GpuFlowParams {
            size: size as u32,
            epsilon: EPSILON,
            _pad: [0; 2],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flow Params Buffer"),
            contents: bytemuck::bytes_of(&gpu_params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Flow Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: height_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: water_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: level_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: share_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: counter_buffer.as_entire_binding() },
            ],
        });

        Some(Self {
            size,
            batch,
            adapter_name,
            device,
            queue,
            levels_pipeline,
            emit_pipeline,
            absorb_pipeline,
            bind_group,
            height_buffer,
            water_buffer,
            counter_buffer,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn encode_tick(&self, encoder: &mut wgpu::CommandEncoder) {
        let groups = (self.size as u32).div_ceil(WORKGROUP_SIDE);
        for (label, pipeline) in [
            ("Flow Levels Pass", &self.levels_pipeline),
            ("Flow Emit Pass", &self.emit_pipeline),
            ("Flow Absorb Pass", &self.absorb_pipeline),
        ] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, 1);
        }
    }

    /// Copy `buffer` to a mappable staging buffer and read it on the host.
    fn read_back<T: Pod>(&self, buffer: &wgpu::Buffer, count: usize) -> Result<Vec<T>> {
        let bytes = (count * std::mem::size_of::<T>()) as u64;
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Copy Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| TerrainError::Gpu(e.to_string()))?
            .map_err(|e| TerrainError::Gpu(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();
        Ok(result)
    }
}

impl FlowBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn tick(&mut self, field: &mut HeightField) -> Result<TickStats> {
        self.tick_n(field, 1)
    }

    fn tick_n(&mut self, field: &mut HeightField, count: usize) -> Result<TickStats> {
        self.check_size(field);
        if count == 0 {
            return Ok(TickStats::default());
        }

        let before = field.water_sum();
        self.queue.write_buffer(&self.height_buffer, 0, bytemuck::cast_slice(field.heights()));
        self.queue.write_buffer(&self.water_buffer, 0, bytemuck::cast_slice(field.water()));
        self.queue.write_buffer(&self.counter_buffer, 0, bytemuck::cast_slice(&[0u32; 2]));

        let mut remaining = count;
        while remaining > 0 {
            let batch_count = remaining.min(self.batch);
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Flow Encoder"),
            });
            for _ in 0..batch_count {
                self.encode_tick(&mut encoder);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
            self.device.poll(wgpu::Maintain::Wait);
            remaining -= batch_count;
        }

        let water: Vec<f32> = self.read_back(&self.water_buffer, self.size * self.size)?;
        let counters: Vec<u32> = self.read_back(&self.counter_buffer, 2)?;

        let (_, field_water) = field.grids_mut();
        field_water.copy_from_slice(&water);

        // The flow rule is conservative, so whatever went missing was clamped.
        let after = field.water_sum();
        Ok(TickStats {
            ticks: count,
            moving_cells: counters[0] as usize,
            clamped_cells: counters[1] as usize,
            clamped_mass: (before - after).max(0.0),
        })
    }
}

/// Check if a GPU adapter can be opened
pub fn is_gpu_available() -> bool {
    GpuBackend::new(1, 1).is_some()
}

/// WGSL compute shader for the flow rule. Mirrors `kernel.rs`.
const FLOW_SHADER: &str = r#"
struct Params {
    size: u32,
    epsilon: f32,
    pad0: u32,
    pad1: u32,
}

@group(0) @binding(0) var<storage, read> heights: array<f32>;
@group(0) @binding(1) var<storage, read_write> water: array<f32>;
@group(0) @binding(2) var<storage, read_write> levels: array<f32>;
@group(0) @binding(3) var<storage, read_write> shares: array<f32>;
@group(0) @binding(4) var<uniform> params: Params;
@group(0) @binding(5) var<storage, read_write> counters: array<atomic<u32>, 2>;

// N, NE, E, SE, S, SW, W, NW
fn offset(k: u32) -> vec2<i32> {
    var offsets = array<vec2<i32>, 8>(
        vec2<i32>(0, -1),
        vec2<i32>(1, -1),
        vec2<i32>(1, 0),
        vec2<i32>(1, 1),
        vec2<i32>(0, 1),
        vec2<i32>(-1, 1),
        vec2<i32>(-1, 0),
        vec2<i32>(-1, -1),
    );
    return offsets[k];
}

// Index of neighbour k, or -1 when it falls off the grid
fn neighbour(cell: vec2<u32>, k: u32) -> i32 {
    let p = vec2<i32>(cell) + offset(k);
    let s = i32(params.size);
    if (p.x < 0 || p.y < 0 || p.x >= s || p.y >= s) {
        return -1;
    }
    return p.y * s + p.x;
}

@compute @workgroup_size(8, 8)
fn levels_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size || id.y >= params.size) {
        return;
    }
    let i = id.y * params.size + id.x;
    levels[i] = heights[i] + water[i];
}

@compute @workgroup_size(8, 8)
fn emit_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size || id.y >= params.size) {
        return;
    }
    let i = id.y * params.size + id.x;
    shares[i] = 0.0;

    let w = water[i];
    if (w <= 0.0) {
        return;
    }

    let level = levels[i];
    var n = 0u;
    var sum = 0.0;
    for (var k = 0u; k < 8u; k = k + 1u) {
        let j = neighbour(id.xy, k);
        if (j >= 0 && levels[j] < level) {
            n = n + 1u;
            sum = sum + levels[j];
        }
    }
    if (n == 0u) {
        return;
    }

    let avg = sum / f32(n);
    let excess = min(w, level - avg);
    if (excess < params.epsilon) {
        return;
    }

    let share = excess / f32(n + 1u);
    let kept = w - share * f32(n);
    if (kept == w) {
        return;
    }
    shares[i] = share;
    water[i] = kept;
    atomicAdd(&counters[0], 1u);
}

@compute @workgroup_size(8, 8)
fn absorb_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.size || id.y >= params.size) {
        return;
    }
    let i = id.y * params.size + id.x;
    let level = levels[i];

    var inflow = 0.0;
    for (var k = 0u; k < 8u; k = k + 1u) {
        let j = neighbour(id.xy, k);
        if (j >= 0 && shares[j] > 0.0 && level < levels[j]) {
            inflow = inflow + shares[j];
        }
    }

    var value = water[i] + inflow;
    if (value < params.epsilon) {
        if (value != 0.0) {
            atomicAdd(&counters[1], 1u);
        }
        value = 0.0;
    }
    water[i] = value;
}
"#;
