use std::f32::consts::PI;
use std::path::Path;

use glint::anyhow::{Context, Result};
use glint::renderer::RayTracerShaders;
use glint::scene::{Instance, MaterialDesc, MaterialModel, Mesh, Scene};
use glint::DemoConfig;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

const SHADER_DIR: &str = "assets/shaders";

/// Glow intensity of the emissive balls.
const LIGHT_INTENSITY: f32 = 1.75;

fn main() -> Result<()> {
    let scene = build_scene()?;
    let shaders = load_shaders()?;

    glint::run(
        DemoConfig {
            title: "glint".to_string(),
            width: WIDTH,
            height: HEIGHT,
            enable_validation_layers: cfg!(debug_assertions),
        },
        scene,
        shaders,
    )
}

fn load_shaders() -> Result<RayTracerShaders> {
    let read = |name: &str| -> Result<Vec<u8>> {
        let path = Path::new(SHADER_DIR).join(name);
        std::fs::read(&path).with_context(|| format!("Failed to read shader {}", path.display()))
    };

    Ok(RayTracerShaders {
        raygen: read("ray-gen.rgen.spv")?,
        miss: read("ray-miss.rmiss.spv")?,
        closest_hit: read("ray-closest-hit.rchit.spv")?,
    })
}

/// A field of metal spheres under a mirror floor plane, lit by emissive
/// spheres scattered between them.
fn build_scene() -> Result<Scene> {
    let mut rng = Rng::new(0x2545F4914F6CDD1D);
    let mut scene = Scene::new();

    let plane = scene.add_geometry(plane_mesh())?;
    let sphere = scene.add_geometry(sphere_mesh(32, 16))?;

    // mirror floor
    let floor_material = scene.add_material(MaterialDesc {
        color: [0.1, 0.1, 0.1],
        model: MaterialModel::Metallic,
        ior: 0.1325,
        texture: None,
    })?;
    scene.add_instance(
        plane,
        Instance {
            transform: [
                64.0, 0.0, 0.0, 0.0, //
                0.0, 64.0, 0.0, -8.75, //
                0.0, 0.0, 64.0, 0.0,
            ],
            material: floor_material,
        },
    )?;

    // 9x9 grid of metal balls with a fuzziness gradient, a few glowing ones
    // sprinkled in
    for xx in 0..=8u32 {
        for zz in 0..=8u32 {
            if (xx * zz) % 4 == 0 && (xx + zz) % 4 == 0 {
                let material = scene.add_material(MaterialDesc {
                    color: [
                        rng.next_f32() * LIGHT_INTENSITY,
                        rng.next_f32() * LIGHT_INTENSITY,
                        rng.next_f32() * LIGHT_INTENSITY,
                    ],
                    model: MaterialModel::Emissive,
                    ior: 0.0,
                    texture: None,
                })?;
                scene.add_instance(
                    sphere,
                    Instance {
                        transform: [
                            1.25, 0.0, 0.0, (xx as f32 - 4.0) * 4.0, //
                            0.0, 1.25, 0.0, -4.0, //
                            0.0, 0.0, 1.25, (zz as f32 - 4.0) * 4.0,
                        ],
                        material,
                    },
                )?;
            } else {
                // for metal the IOR acts as the surface fuzziness
                let material = scene.add_material(MaterialDesc {
                    color: [0.175, 0.175, 0.175],
                    model: MaterialModel::Metallic,
                    ior: 1.0 - (xx * 8 + zz) as f32 / 64.0,
                    texture: None,
                })?;
                scene.add_instance(
                    sphere,
                    Instance {
                        transform: [
                            1.5, 0.0, 0.0, (xx as f32 - 4.0) * 4.0, //
                            0.0, 1.5, 0.0, -7.2125, //
                            0.0, 0.0, 1.5, (zz as f32 - 4.0) * 4.0,
                        ],
                        material,
                    },
                )?;
            }
        }
    }

    // light balls scattered around the grid
    for _ in 0..32 {
        let xx = rng.next_f32() * 32.0 - 16.0;
        let zz = rng.next_f32() * 32.0 - 16.0;
        let material = scene.add_material(MaterialDesc {
            color: [0.996, 0.916, 0.8058],
            model: MaterialModel::Emissive,
            ior: 0.0,
            texture: None,
        })?;
        scene.add_instance(
            sphere,
            Instance {
                transform: [
                    1.0, 0.0, 0.0, xx + xx.signum() * rng.next_f32() * 48.0, //
                    0.0, 1.0, 0.0, -7.75, //
                    0.0, 0.0, 1.0, zz + zz.signum() * rng.next_f32() * 48.0,
                ],
                material,
            },
        )?;
    }

    Ok(scene)
}

/// Unit quad in the xz plane, facing up.
fn plane_mesh() -> Mesh {
    Mesh {
        positions: vec![
            [-1.0, 0.0, -1.0],
            [1.0, 0.0, -1.0],
            [1.0, 0.0, 1.0],
            [-1.0, 0.0, 1.0],
        ],
        normals: vec![[0.0, 1.0, 0.0]; 4],
        tangents: vec![[1.0, 0.0, 0.0]; 4],
        uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        indices: vec![0, 2, 1, 0, 3, 2],
    }
}

/// Unit radius uv sphere with `sectors` subdivisions around the equator and
/// `stacks` from pole to pole.
fn sphere_mesh(sectors: u32, stacks: u32) -> Mesh {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tangents = Vec::new();
    let mut uvs = Vec::new();

    for stack in 0..=stacks {
        let v = stack as f32 / stacks as f32;
        let phi = v * PI;
        for sector in 0..=sectors {
            let u = sector as f32 / sectors as f32;
            let theta = u * 2.0 * PI;

            let x = phi.sin() * theta.cos();
            let y = phi.cos();
            let z = phi.sin() * theta.sin();

            positions.push([x, y, z]);
            normals.push([x, y, z]);
            tangents.push([-theta.sin(), 0.0, theta.cos()]);
            uvs.push([u, v]);
        }
    }

    let mut indices = Vec::new();
    let ring = sectors + 1;
    for stack in 0..stacks {
        for sector in 0..sectors {
            let i0 = stack * ring + sector;
            let i1 = i0 + ring;

            if stack != 0 {
                indices.extend_from_slice(&[i0, i1, i0 + 1]);
            }
            if stack != stacks - 1 {
                indices.extend_from_slice(&[i0 + 1, i1, i1 + 1]);
            }
        }
    }

    Mesh {
        positions,
        normals,
        tangents,
        uvs,
        indices,
    }
}

/// xorshift64*, deterministic so the demo scene is reproducible.
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform in [0, 1).
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_has_two_triangles() {
        let mesh = plane_mesh();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn sphere_counts_match_subdivision() {
        let mesh = sphere_mesh(32, 16);
        assert_eq!(mesh.vertex_count(), 33 * 17);
        // top and bottom stacks contribute one triangle per sector, the rest two
        assert_eq!(mesh.triangle_count() as u32, 32 * (2 * 16 - 2));
    }

    #[test]
    fn sphere_normals_are_unit_length() {
        let mesh = sphere_mesh(8, 4);
        for normal in &mesh.normals {
            let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn rng_stays_in_unit_range() {
        let mut rng = Rng::new(1);
        for _ in 0..1000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn demo_scene_builds() {
        let scene = build_scene().unwrap();
        assert_eq!(scene.geometry_count(), 2);
        // floor + 81 grid balls + 32 light balls
        assert_eq!(scene.instance_count(), 1 + 81 + 32);
    }
}
