use anyhow::{ensure, Result};
use ash::vk;

use crate::scene::Scene;
use crate::vulkan::{Buffer, Context};

/// The instance custom index is 24 bits wide on the wire, so the scene is
/// capped at 2^24 instances.
pub const MAX_INSTANCE_COUNT: usize = 1 << 24;

const MATERIAL_ID_BITS: u32 = 16;
const GEOMETRY_ID_BITS: u32 = 8;

pub fn ensure_instance_capacity(count: usize) -> Result<()> {
    ensure!(
        count <= MAX_INSTANCE_COUNT,
        "Scene has {count} instances, the instance buffer is limited to {MAX_INSTANCE_COUNT}"
    );

    Ok(())
}

/// Packs `material_id` into the low 16 bits and `geometry_id` into the high
/// 8 bits of the 24 bit custom index.
pub fn pack_custom_index(material_id: usize, geometry_id: usize) -> Result<u32> {
    ensure!(
        material_id < 1 << MATERIAL_ID_BITS,
        "Material id {material_id} does not fit into {MATERIAL_ID_BITS} bits"
    );
    ensure!(
        geometry_id < 1 << GEOMETRY_ID_BITS,
        "Geometry id {geometry_id} does not fit into {GEOMETRY_ID_BITS} bits"
    );

    Ok(material_id as u32 | (geometry_id as u32) << MATERIAL_ID_BITS)
}

/// Builds the 64 byte wire records the top level build consumes. `handles`
/// are the resolved bottom level addresses, one per geometry, so this must
/// run after the bottom level bind phase. All capacity checks happen before
/// the first record is written.
pub fn build_instance_records(
    scene: &Scene,
    handles: &[u64],
) -> Result<Vec<vk::AccelerationStructureInstanceKHR>> {
    ensure!(
        handles.len() == scene.geometry_count(),
        "Got {} bottom level handles for {} geometries",
        handles.len(),
        scene.geometry_count()
    );
    ensure_instance_capacity(scene.instance_count())?;

    let mut records = Vec::with_capacity(scene.instance_count());
    for (geometry_id, instances) in scene.instances.iter().enumerate() {
        for instance in instances {
            let custom_index = pack_custom_index(instance.material.0, geometry_id)?;

            records.push(vk::AccelerationStructureInstanceKHR {
                transform: vk::TransformMatrixKHR {
                    matrix: instance.transform,
                },
                instance_custom_index_and_mask: vk::Packed24_8::new(custom_index, 0xff),
                instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                    0,
                    vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE
                        .as_raw() as u8,
                ),
                acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                    device_handle: handles[geometry_id],
                },
            });
        }
    }

    Ok(records)
}

/// Device local instance array used both as top level build input and as a
/// storage buffer for the hit shaders.
pub struct InstanceBuffer {
    pub buffer: Buffer,
    pub count: u32,
}

impl InstanceBuffer {
    pub fn create(context: &Context, scene: &Scene, handles: &[u64]) -> Result<Self> {
        let records = build_instance_records(scene, handles)?;

        let buffer = context.create_gpu_only_buffer_from_data(
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            &records,
        )?;

        Ok(Self {
            buffer,
            count: records.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Instance, MaterialDesc, MaterialId, MaterialModel, Mesh};
    use std::mem::size_of;

    fn scene_with_one_instance() -> Scene {
        let mut scene = Scene::new();
        let geometry = scene
            .add_geometry(Mesh {
                positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: vec![[0.0, 0.0, 1.0]; 3],
                tangents: vec![[1.0, 0.0, 0.0]; 3],
                uvs: vec![[0.0; 2]; 3],
                indices: vec![0, 1, 2],
            })
            .unwrap();
        let material = scene
            .add_material(MaterialDesc {
                color: [1.0; 3],
                model: MaterialModel::Lambertian,
                ior: 0.0,
                texture: None,
            })
            .unwrap();
        scene
            .add_instance(geometry, Instance::identity(material))
            .unwrap();
        scene
    }

    #[test]
    fn wire_record_is_64_bytes() {
        assert_eq!(size_of::<vk::AccelerationStructureInstanceKHR>(), 64);
    }

    #[test]
    fn capacity_check_allows_exactly_2_pow_24() {
        assert!(ensure_instance_capacity(MAX_INSTANCE_COUNT).is_ok());
        assert!(ensure_instance_capacity(MAX_INSTANCE_COUNT + 1).is_err());
    }

    #[test]
    fn custom_index_packs_material_low_geometry_high() {
        assert_eq!(pack_custom_index(5, 3).unwrap(), 0x03_0005);
        assert_eq!(pack_custom_index(0xffff, 0xff).unwrap(), 0xff_ffff);
        assert!(pack_custom_index(1 << 16, 0).is_err());
        assert!(pack_custom_index(0, 1 << 8).is_err());
    }

    #[test]
    fn records_embed_handle_mask_and_flags() {
        let scene = scene_with_one_instance();
        let records = build_instance_records(&scene, &[0xdead_beef]).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.instance_custom_index_and_mask.low_24(), 0);
        assert_eq!(record.instance_custom_index_and_mask.high_8(), 0xff);
        assert_eq!(
            record
                .instance_shader_binding_table_record_offset_and_flags
                .low_24(),
            0
        );
        assert_eq!(
            u32::from(
                record
                    .instance_shader_binding_table_record_offset_and_flags
                    .high_8()
            ),
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw()
        );
        assert_eq!(
            unsafe { record.acceleration_structure_reference.device_handle },
            0xdead_beef
        );
        assert_eq!(record.transform.matrix[0], 1.0);
    }

    #[test]
    fn handle_count_must_match_geometry_count() {
        let scene = scene_with_one_instance();
        assert!(build_instance_records(&scene, &[]).is_err());
        assert!(build_instance_records(&scene, &[1, 2]).is_err());
    }
}
