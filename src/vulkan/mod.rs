pub extern crate ash;
pub extern crate ash_window;
pub extern crate gpu_allocator;

mod buffer;
mod command;
mod context;
mod descriptor;
mod device;
mod image;
mod instance;
pub mod physical_device;
mod queue;
mod ray_tracing;
mod sampler;
mod surface;
mod swapchain;
mod sync;

pub mod utils;

pub use buffer::*;
pub use command::*;
pub use context::*;
pub use descriptor::*;
pub use device::*;
pub use image::*;
pub use queue::*;
pub use ray_tracing::*;
pub use sampler::*;
pub use swapchain::*;
pub use sync::*;
