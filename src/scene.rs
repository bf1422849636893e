use anyhow::{bail, ensure, Result};

/// Numeric tags are shared with the shader side and end up verbatim in the
/// material records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialModel {
    Emissive = 0,
    Metallic = 1,
    Dielectric = 2,
    Lambertian = 3,
}

/// Indices of refraction for common media.
///
/// Source: https://en.wikipedia.org/wiki/Refractive_index
pub mod index_of_refraction {
    pub const VACUUM: f32 = 1.0;
    pub const AIR: f32 = 1.000293;
    pub const HELIUM: f32 = 1.000036;
    pub const HYDROGEN: f32 = 1.000132;
    pub const CARBON_DIOXIDE: f32 = 1.00045;
    // Liquids at 20 °C
    pub const WATER: f32 = 1.333;
    pub const ETHANOL: f32 = 1.36;
    pub const OLIVE_OIL: f32 = 1.47;
    // Solids
    pub const ICE: f32 = 1.31;
    pub const QUARTZ: f32 = 1.46;
    pub const PMMA: f32 = 1.49;
    pub const WINDOW_GLASS: f32 = 1.52;
    pub const POLYCARBONATE: f32 = 1.58;
    pub const FLINT_GLASS: f32 = 1.62;
    pub const SAPPHIRE: f32 = 1.77;
    pub const CUBIC_ZIRCONIA: f32 = 2.15;
    pub const DIAMOND: f32 = 2.42;
    pub const MOISSANITE: f32 = 2.65;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) usize);

/// Triangle mesh with one attribute set per vertex. Indices reference the
/// shared position/normal/tangent/uv arrays.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.positions.is_empty(), "Mesh has no vertices");
        ensure!(!self.indices.is_empty(), "Mesh has no indices");
        ensure!(
            self.indices.len() % 3 == 0,
            "Mesh index count {} is not a multiple of 3",
            self.indices.len()
        );

        let vertex_count = self.positions.len();
        for (name, count) in [
            ("normal", self.normals.len()),
            ("tangent", self.tangents.len()),
            ("uv", self.uvs.len()),
        ] {
            ensure!(
                count == vertex_count,
                "Mesh {name} array length {count} does not match vertex count {vertex_count}"
            );
        }

        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            bail!("Mesh index {index} is out of range for {vertex_count} vertices");
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub color: [f32; 3],
    pub model: MaterialModel,
    pub ior: f32,
    pub texture: Option<TextureId>,
}

/// Raw RGBA8 pixel data.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureDesc {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "Texture has zero extent ({}x{})",
            self.width,
            self.height
        );
        let expected = self.width as usize * self.height as usize * 4;
        ensure!(
            self.pixels.len() == expected,
            "Texture pixel data is {} bytes, expected {} for {}x{} RGBA",
            self.pixels.len(),
            expected,
            self.width,
            self.height
        );

        Ok(())
    }
}

/// One placement of a geometry in the world.
#[derive(Debug, Clone)]
pub struct Instance {
    /// 3x4 row-major object-to-world transform.
    pub transform: [f32; 12],
    pub material: MaterialId,
}

impl Instance {
    pub fn identity(material: MaterialId) -> Self {
        let mut transform = [0.0; 12];
        transform[0] = 1.0;
        transform[5] = 1.0;
        transform[10] = 1.0;
        Self {
            transform,
            material,
        }
    }
}

/// CPU-side scene description. Everything is validated on insertion so the
/// GPU compilation stage can assume well-formed inputs.
#[derive(Default)]
pub struct Scene {
    pub(crate) meshes: Vec<Mesh>,
    pub(crate) instances: Vec<Vec<Instance>>,
    pub(crate) materials: Vec<MaterialDesc>,
    pub(crate) textures: Vec<TextureDesc>,
    pub(crate) skybox: Option<TextureDesc>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, mesh: Mesh) -> Result<GeometryId> {
        mesh.validate()?;
        self.meshes.push(mesh);
        self.instances.push(Vec::new());

        Ok(GeometryId(self.meshes.len() - 1))
    }

    pub fn add_material(&mut self, material: MaterialDesc) -> Result<MaterialId> {
        ensure!(
            material.ior.is_finite(),
            "Material IOR must be finite, got {}",
            material.ior
        );
        if let Some(TextureId(index)) = material.texture {
            ensure!(
                index < self.textures.len(),
                "Material references unregistered texture {index}"
            );
        }
        self.materials.push(material);

        Ok(MaterialId(self.materials.len() - 1))
    }

    pub fn add_texture(&mut self, texture: TextureDesc) -> Result<TextureId> {
        texture.validate()?;
        self.textures.push(texture);

        Ok(TextureId(self.textures.len() - 1))
    }

    pub fn set_skybox(&mut self, texture: TextureDesc) -> Result<()> {
        texture.validate()?;
        self.skybox = Some(texture);

        Ok(())
    }

    pub fn add_instance(&mut self, geometry: GeometryId, instance: Instance) -> Result<()> {
        ensure!(
            geometry.0 < self.meshes.len(),
            "Unknown geometry id {}",
            geometry.0
        );
        ensure!(
            instance.material.0 < self.materials.len(),
            "Instance references unknown material {}",
            instance.material.0
        );
        ensure!(
            instance.transform.iter().all(|c| c.is_finite()),
            "Instance transform contains non-finite components"
        );
        self.instances[geometry.0].push(instance);

        Ok(())
    }

    pub fn geometry_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tangents: vec![[1.0, 0.0, 0.0]; 3],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn add_geometry_accepts_valid_mesh() {
        let mut scene = Scene::new();
        let id = scene.add_geometry(triangle()).unwrap();
        assert_eq!(id, GeometryId(0));
    }

    #[test]
    fn add_geometry_rejects_truncated_triangles() {
        let mut mesh = triangle();
        mesh.indices.pop();

        let mut scene = Scene::new();
        assert!(scene.add_geometry(mesh).is_err());
    }

    #[test]
    fn add_geometry_rejects_out_of_range_index() {
        let mut mesh = triangle();
        mesh.indices[2] = 7;

        let mut scene = Scene::new();
        assert!(scene.add_geometry(mesh).is_err());
    }

    #[test]
    fn add_geometry_rejects_mismatched_attribute_lengths() {
        let mut mesh = triangle();
        mesh.uvs.pop();

        let mut scene = Scene::new();
        assert!(scene.add_geometry(mesh).is_err());
    }

    #[test]
    fn add_material_rejects_unregistered_texture() {
        let mut scene = Scene::new();
        let result = scene.add_material(MaterialDesc {
            color: [1.0, 1.0, 1.0],
            model: MaterialModel::Lambertian,
            ior: 0.0,
            texture: Some(TextureId(0)),
        });
        assert!(result.is_err());
    }

    #[test]
    fn add_material_rejects_non_finite_ior() {
        let mut scene = Scene::new();
        let result = scene.add_material(MaterialDesc {
            color: [1.0, 1.0, 1.0],
            model: MaterialModel::Dielectric,
            ior: f32::NAN,
            texture: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn add_texture_rejects_wrong_pixel_count() {
        let mut scene = Scene::new();
        let result = scene.add_texture(TextureDesc {
            width: 2,
            height: 2,
            pixels: vec![0; 15],
        });
        assert!(result.is_err());
    }

    #[test]
    fn add_instance_requires_known_ids() {
        let mut scene = Scene::new();
        let geometry = scene.add_geometry(triangle()).unwrap();
        let material = scene
            .add_material(MaterialDesc {
                color: [1.0, 0.0, 0.0],
                model: MaterialModel::Lambertian,
                ior: 0.0,
                texture: None,
            })
            .unwrap();

        assert!(scene
            .add_instance(geometry, Instance::identity(material))
            .is_ok());
        assert!(scene
            .add_instance(GeometryId(9), Instance::identity(material))
            .is_err());
        assert!(scene
            .add_instance(geometry, Instance::identity(MaterialId(9)))
            .is_err());
        assert_eq!(scene.instance_count(), 1);
    }

    #[test]
    fn material_model_tags_match_shader_side() {
        assert_eq!(MaterialModel::Emissive as u32, 0);
        assert_eq!(MaterialModel::Metallic as u32, 1);
        assert_eq!(MaterialModel::Dielectric as u32, 2);
        assert_eq!(MaterialModel::Lambertian as u32, 3);
    }
}
