use wgpu::util::DeviceExt;

/// Two triangles covering the whole surface in normalised device coordinates.
pub(crate) const QUAD_VERTICES: [[f32; 2]; 6] = [
    [1.0, 1.0],
    [-1.0, 1.0],
    [-1.0, -1.0],
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

const VERTEX_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;

pub(crate) struct GeometryBuffer {
    buffer: wgpu::Buffer,
}

impl GeometryBuffer {
    pub fn upload(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("crt quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES[..]),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self { buffer }
    }

    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }

    pub fn vertex_count(&self) -> u32 {
        QUAD_VERTICES.len() as u32
    }
}

pub(crate) fn vertex_attributes(location: u32) -> [wgpu::VertexAttribute; 1] {
    [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 0,
        shader_location: location,
    }]
}

pub(crate) fn vertex_layout(attributes: &[wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'_> {
    wgpu::VertexBufferLayout {
        array_stride: VERTEX_STRIDE,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_covers_both_diagonals() {
        let corners = [[1.0, 1.0], [-1.0, 1.0], [-1.0, -1.0], [1.0, -1.0]];
        for corner in corners {
            assert!(QUAD_VERTICES.contains(&corner), "missing corner {corner:?}");
        }
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES[..]);
        assert_eq!(bytes.len() as u64, VERTEX_STRIDE * 6);
    }
}
