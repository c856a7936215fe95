//! Synchronous buffer readback.

use std::sync::mpsc;

use crate::error::GpuError;

/// Copies `(offset, size)` regions of `buffer` into a staging buffer and
/// returns their bytes, concatenated in order.
///
/// Blocks until the GPU has finished all submitted work. Offsets and sizes
/// must be multiples of [`wgpu::COPY_BUFFER_ALIGNMENT`].
pub fn read_buffer_regions(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    regions: &[(u64, u64)],
) -> Result<Vec<u8>, GpuError> {
    let total: u64 = regions.iter().map(|&(_, size)| size).sum();
    if total == 0 {
        return Ok(Vec::new());
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: total,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    let mut staging_offset = 0;
    for &(offset, size) in regions {
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, staging_offset, size);
        staging_offset += size;
    }
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(GpuError::BufferMapping(e.to_string())),
        Err(_) => return Err(GpuError::BufferMapping("map callback was dropped".to_string())),
    }

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}
