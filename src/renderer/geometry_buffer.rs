use anyhow::{ensure, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::scene::{MaterialDesc, Mesh, Scene};
use crate::vulkan::{Buffer, Context};

/// Per ray-hit corner attributes, 48 bytes. One record per index entry so the
/// hit shader can fetch by `face * 3 + barycentric corner` without touching
/// the source vertex arrays.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct VertexAttribute {
    pub normal: [f32; 3],
    _pad0: f32,
    pub tangent: [f32; 3],
    _pad1: f32,
    pub uv: [f32; 2],
    _pad2: [f32; 2],
}

/// Triangle corner indices into the flattened attribute stream, uvec4 packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Face {
    pub indices: [u32; 3],
    _pad: u32,
}

/// 32 byte material record as the hit shaders read it. Texture index 0 means
/// untextured, registered textures are offset by one.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MaterialRecord {
    pub color: [f32; 3],
    pub model: u32,
    pub ior: f32,
    pub texture_index: u32,
    _pad: [u32; 2],
}

/// One attribute record per index entry, in index order. The v coordinate is
/// flipped into Vulkan's texture space.
pub fn flatten_attributes(mesh: &Mesh) -> Vec<VertexAttribute> {
    mesh.indices
        .iter()
        .map(|&index| {
            let index = index as usize;
            let uv = mesh.uvs[index];
            VertexAttribute {
                normal: mesh.normals[index],
                _pad0: 0.0,
                tangent: mesh.tangents[index],
                _pad1: 0.0,
                uv: [uv[0], 1.0 - uv[1]],
                _pad2: [0.0; 2],
            }
        })
        .collect()
}

/// One face record per triangle, corners `(3i, 3i+1, 3i+2)`.
pub fn flatten_faces(index_count: usize) -> Vec<Face> {
    (0..index_count / 3)
        .map(|face| {
            let corner = face as u32 * 3;
            Face {
                indices: [corner, corner + 1, corner + 2],
                _pad: 0,
            }
        })
        .collect()
}

pub fn material_record(material: &MaterialDesc, texture_count: usize) -> Result<MaterialRecord> {
    let texture_index = match material.texture {
        None => 0,
        Some(texture) => {
            ensure!(
                texture.0 < texture_count,
                "Material references unregistered texture {}",
                texture.0
            );
            texture.0 as u32 + 1
        }
    };

    Ok(MaterialRecord {
        color: material.color,
        model: material.model as u32,
        ior: material.ior,
        texture_index,
        _pad: [0; 2],
    })
}

/// Device local copies of the flattened streams, one attribute and face
/// buffer per geometry and one record buffer per material. Indexed in the
/// shaders through the instance custom index.
pub struct SceneGeometryBuffer {
    pub attributes: Vec<Buffer>,
    pub faces: Vec<Buffer>,
    pub materials: Vec<Buffer>,
}

impl SceneGeometryBuffer {
    pub fn create(context: &Context, scene: &Scene) -> Result<Self> {
        const USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::STORAGE_BUFFER;

        let mut attributes = Vec::with_capacity(scene.meshes.len());
        let mut faces = Vec::with_capacity(scene.meshes.len());
        for mesh in &scene.meshes {
            let attribute_data = flatten_attributes(mesh);
            attributes.push(context.create_gpu_only_buffer_from_data(USAGE, &attribute_data)?);

            let face_data = flatten_faces(mesh.indices.len());
            faces.push(context.create_gpu_only_buffer_from_data(USAGE, &face_data)?);

            log::trace!(
                "Flattened geometry: {} attribute bytes, {} face bytes",
                std::mem::size_of_val(attribute_data.as_slice()),
                std::mem::size_of_val(face_data.as_slice()),
            );
        }

        let mut materials = Vec::with_capacity(scene.materials.len());
        for material in &scene.materials {
            let record = material_record(material, scene.textures.len())?;
            materials
                .push(context.create_gpu_only_buffer_from_data(USAGE, &[record])?);
        }

        Ok(Self {
            attributes,
            faces,
            materials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MaterialModel, TextureId};
    use std::mem::size_of;

    fn triangle() -> Mesh {
        Mesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
            tangents: vec![[1.0, 0.0, 0.0]; 3],
            uvs: vec![[0.0, 0.25], [1.0, 0.5], [0.0, 1.0]],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn record_sizes_are_wire_exact() {
        assert_eq!(size_of::<VertexAttribute>(), 48);
        assert_eq!(size_of::<Face>(), 16);
        assert_eq!(size_of::<MaterialRecord>(), 32);
    }

    #[test]
    fn one_triangle_scene_buffer_sizes() {
        let mesh = triangle();
        let attributes = flatten_attributes(&mesh);
        let faces = flatten_faces(mesh.indices.len());

        assert_eq!(std::mem::size_of_val(attributes.as_slice()), 144);
        assert_eq!(std::mem::size_of_val(faces.as_slice()), 16);
    }

    #[test]
    fn attributes_follow_index_order_and_flip_v() {
        let mut mesh = triangle();
        mesh.indices = vec![2, 0, 1];
        let attributes = flatten_attributes(&mesh);

        assert_eq!(attributes[0].normal, [1.0, 0.0, 0.0]);
        assert_eq!(attributes[0].uv, [0.0, 0.0]);
        assert_eq!(attributes[1].normal, [0.0, 0.0, 1.0]);
        assert_eq!(attributes[1].uv, [0.0, 0.75]);
        assert_eq!(attributes[2].uv, [1.0, 0.5]);
    }

    #[test]
    fn faces_enumerate_flattened_corners() {
        let faces = flatten_faces(6);

        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].indices, [0, 1, 2]);
        assert_eq!(faces[1].indices, [3, 4, 5]);
    }

    #[test]
    fn material_record_resolves_texture_indices() {
        let mut material = MaterialDesc {
            color: [0.5, 0.25, 1.0],
            model: MaterialModel::Metallic,
            ior: 0.4,
            texture: None,
        };

        let record = material_record(&material, 2).unwrap();
        assert_eq!(record.texture_index, 0);

        material.texture = Some(TextureId(1));
        let record = material_record(&material, 2).unwrap();
        assert_eq!(record.texture_index, 2);
        assert_eq!(record.model, 1);
        assert_eq!(record.color, [0.5, 0.25, 1.0]);

        material.texture = Some(TextureId(2));
        assert!(material_record(&material, 2).is_err());
    }

    #[test]
    fn staging_size_scales_with_material_count() {
        let material = MaterialDesc {
            color: [0.2; 3],
            model: MaterialModel::Lambertian,
            ior: 0.0,
            texture: None,
        };

        let records = (0..32)
            .map(|_| material_record(&material, 0).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(std::mem::size_of_val(records.as_slice()), 32 * 32);
    }

    #[test]
    fn material_record_survives_byte_round_trip() {
        let record = material_record(
            &MaterialDesc {
                color: [0.1, 0.2, 0.3],
                model: MaterialModel::Dielectric,
                ior: 1.52,
                texture: Some(TextureId(0)),
            },
            1,
        )
        .unwrap();

        let bytes = bytemuck::bytes_of(&record);
        assert_eq!(bytes.len(), 32);
        let back: MaterialRecord = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, record);
    }
}
