//! Hard-coded geometry and uniform layout

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::config::RenderFeatures;
use crate::foundation::math::Mat4;

/// Position plus texture coordinate, tightly packed
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object space position
    pub position: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    const fn new(x: f32, y: f32, z: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, z],
            uv: [u, v],
        }
    }

    /// Single interleaved binding
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Location 0 is the position, location 1 the UV
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::size_of::<[f32; 3]>() as u32,
            },
        ]
    }
}

/// Unit quad in the XY plane at depth `z`, as two clockwise triangles
pub fn quad(z: f32) -> [Vertex; 6] {
    [
        Vertex::new(-0.5, 0.5, z, 0.0, 0.0),
        Vertex::new(0.5, 0.5, z, 1.0, 0.0),
        Vertex::new(-0.5, -0.5, z, 0.0, 1.0),
        Vertex::new(-0.5, -0.5, z, 0.0, 1.0),
        Vertex::new(0.5, 0.5, z, 1.0, 0.0),
        Vertex::new(0.5, -0.5, z, 1.0, 1.0),
    ]
}

/// Geometry drawn by each program variant
///
/// With depth testing a second quad sits behind the first so the depth buffer
/// has something to resolve.
pub fn scene_vertices(features: RenderFeatures) -> Vec<Vertex> {
    let mut vertices = quad(0.0).to_vec();
    if features.depth {
        vertices.extend_from_slice(&quad(0.2));
    }
    vertices
}

/// Contents of the uniform buffer at binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewProjection {
    /// Column-major world to clip matrix
    pub matrix: [[f32; 4]; 4],
}

impl From<Mat4> for ViewProjection {
    fn from(matrix: Mat4) -> Self {
        Self {
            matrix: matrix.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding_description().stride, 20);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].location, 1);
    }

    #[test]
    fn test_vertex_counts_per_variant() {
        let flat = scene_vertices(RenderFeatures { mipmaps: true, depth: false });
        assert_eq!(flat.len(), 6);

        let layered = scene_vertices(RenderFeatures { mipmaps: true, depth: true });
        assert_eq!(layered.len(), 12);
        assert!(layered[..6].iter().all(|v| v.position[2] == 0.0));
        assert!(layered[6..].iter().all(|v| (v.position[2] - 0.2).abs() < f32::EPSILON));
    }

    #[test]
    fn test_uniform_is_one_mat4() {
        assert_eq!(std::mem::size_of::<ViewProjection>(), 64);
        let uniform = ViewProjection::from(Mat4::identity());
        assert_eq!(uniform.matrix[3][3], 1.0);
        assert_eq!(uniform.matrix[0][1], 0.0);
    }

    #[test]
    fn test_uniform_is_column_major() {
        let mut matrix = Mat4::identity();
        matrix[(0, 3)] = 5.0;
        let uniform = ViewProjection::from(matrix);
        // translation lives in the fourth column
        assert_eq!(uniform.matrix[3][0], 5.0);
    }
}
