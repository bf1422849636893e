pub extern crate anyhow;
pub extern crate glam;
pub extern crate log;
pub extern crate winit;

pub mod camera;
pub mod controls;
pub mod logger;
pub mod renderer;
pub mod scene;
pub mod vulkan;

use std::time::{Duration, Instant};

use anyhow::Result;
use ash::vk;
use log::{error, info};
use winit::{
    dpi::PhysicalSize,
    event::{Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowBuilder},
};

use crate::controls::Controls;
use crate::renderer::{RayTracer, RayTracerShaders};
use crate::scene::Scene;
use crate::vulkan::{
    CommandBuffer, CommandPool, Context, Fence, Semaphore, SemaphoreSubmitInfo, Swapchain,
};

const TITLE_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

pub struct DemoConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub enable_validation_layers: bool,
}

struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    fence: Fence,
}

struct App {
    ray_tracer: RayTracer,
    command_buffers: Vec<CommandBuffer>,
    _command_pool: CommandPool,
    frame_syncs: Vec<FrameSync>,
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    swapchain: Swapchain,
    context: Context,

    controls: Controls,
    title: String,
    last_title_update: Instant,
    frames_since_update: u32,
}

impl App {
    fn new(window: &Window, config: &DemoConfig, scene: &Scene, shaders: &RayTracerShaders) -> Result<Self> {
        let context = Context::new(window, window, &config.title, config.enable_validation_layers)?;

        let swapchain = Swapchain::new(&context, config.width, config.height)?;

        let ray_tracer = RayTracer::create(
            &context,
            scene,
            shaders,
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format,
        )?;

        let command_pool = context.create_command_pool(
            context.physical_device.graphics_queue_family,
            Some(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
        )?;
        let command_buffers = command_pool.allocate_command_buffers(
            vk::CommandBufferLevel::PRIMARY,
            swapchain.images.len() as u32,
        )?;
        ray_tracer.record_draw_commands(&command_buffers, &swapchain)?;

        let frame_syncs = swapchain
            .images
            .iter()
            .map(|_| {
                Ok(FrameSync {
                    image_available: context.create_semaphore()?,
                    render_finished: context.create_semaphore()?,
                    fence: context.create_fence(Some(vk::FenceCreateFlags::SIGNALED))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let images_in_flight = vec![None; swapchain.images.len()];

        Ok(Self {
            ray_tracer,
            command_buffers,
            _command_pool: command_pool,
            frame_syncs,
            images_in_flight,
            current_frame: 0,
            swapchain,
            context,
            controls: Controls::default(),
            title: config.title.clone(),
            last_title_update: Instant::now(),
            frames_since_update: 0,
        })
    }

    fn apply_input(&mut self) {
        let controls = self.controls;
        let camera = &mut self.ray_tracer.camera;

        if controls.left_click && controls.cursor_delta != glam::Vec2::ZERO {
            camera.on_drag(controls.cursor_delta.x, controls.cursor_delta.y);
        }
        if controls.scroll_delta != 0.0 {
            camera.on_scroll(controls.scroll_delta);
        }
        self.controls.reset();
    }

    /// One frame of the steady state loop. Returns false once the swapchain
    /// went stale and the loop should end.
    fn draw(&mut self, window: &Window) -> Result<bool> {
        let current = self.current_frame;
        self.frame_syncs[current].fence.wait(None)?;

        self.apply_input();
        self.ray_tracer.update()?;

        let acquired = match self
            .swapchain
            .acquire_next_image(u64::MAX, &self.frame_syncs[current].image_available)
        {
            Ok(acquired) => acquired,
            Err(err) => {
                return match err.downcast_ref::<vk::Result>() {
                    Some(&vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
                    _ => Err(err),
                };
            }
        };

        // The driver may hand out image indices out of round robin order, so
        // the per frame fence alone does not prove this image's command
        // buffer left the pending state.
        let image_index = acquired.index as usize;
        if let Some(slot) = track_image_in_flight(&mut self.images_in_flight, image_index, current)
        {
            self.frame_syncs[slot].fence.wait(None)?;
        }

        self.frame_syncs[current].fence.reset()?;

        self.context.graphics_queue.submit(
            &self.command_buffers[image_index],
            Some(SemaphoreSubmitInfo {
                semaphore: &self.frame_syncs[current].image_available,
                stage_mask: vk::PipelineStageFlags2::TRANSFER,
            }),
            Some(SemaphoreSubmitInfo {
                semaphore: &self.frame_syncs[current].render_finished,
                stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            }),
            &self.frame_syncs[current].fence,
        )?;

        let present_result = self.swapchain.queue_present(
            acquired.index,
            &[&self.frame_syncs[current].render_finished],
            &self.context.present_queue,
        );
        match present_result {
            Ok(_) => {}
            Err(err) => {
                return match err.downcast_ref::<vk::Result>() {
                    Some(&vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
                    _ => Err(err),
                };
            }
        }

        self.current_frame = (self.current_frame + 1) % self.frame_syncs.len();

        self.frames_since_update += 1;
        let elapsed = self.last_title_update.elapsed();
        if elapsed >= TITLE_UPDATE_INTERVAL {
            let fps = self.frames_since_update as f32 / elapsed.as_secs_f32();
            window.set_title(&format!(
                "{} | {} | {:.0} fps | {} samples",
                self.title,
                self.context.physical_device.name,
                fps,
                self.ray_tracer.total_sample_count(),
            ));
            self.last_title_update = Instant::now();
            self.frames_since_update = 0;
        }

        Ok(true)
    }
}

/// Remembers which frame slot last submitted against `image_index` and
/// returns the slot whose fence must complete before that image's command
/// buffer may be submitted again.
fn track_image_in_flight(
    images_in_flight: &mut [Option<usize>],
    image_index: usize,
    frame: usize,
) -> Option<usize> {
    let previous = images_in_flight[image_index];
    images_in_flight[image_index] = Some(frame);
    previous.filter(|&slot| slot != frame)
}

/// Opens the window, compiles the scene to the GPU and runs the render loop
/// until the window closes.
pub fn run(config: DemoConfig, scene: Scene, shaders: RayTracerShaders) -> Result<()> {
    logger::log_init()?;

    info!("Starting {}", config.title);

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_resizable(false)
        .build(&event_loop)?;

    let mut app = App::new(&window, &config, &scene, &shaders)?;
    let mut is_running = true;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                app.controls.handle_window_event(&event);
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                logical_key: Key::Named(NamedKey::Escape),
                                ..
                            },
                        ..
                    } => elwt.exit(),
                    _ => {}
                }
            }
            Event::DeviceEvent { event, .. } => {
                app.controls.handle_device_event(&event);
            }
            Event::AboutToWait => {
                if !is_running {
                    return;
                }
                match app.draw(&window) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("Swapchain went out of date, stopping");
                        is_running = false;
                        elwt.exit();
                    }
                    Err(err) => {
                        error!("Frame failed: {err:?}");
                        is_running = false;
                        elwt.exit();
                    }
                }
            }
            Event::LoopExiting => {
                if let Err(err) = app.context.device_wait_idle() {
                    error!("Failed to wait for device idle: {err:?}");
                }
            }
            _ => {}
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_image_acquire_waits_on_the_prior_frames_fence() {
        let mut images_in_flight = vec![None; 3];

        assert_eq!(track_image_in_flight(&mut images_in_flight, 0, 0), None);
        // the driver is free to hand out image 0 again on the next frame
        assert_eq!(track_image_in_flight(&mut images_in_flight, 0, 1), Some(0));
        assert_eq!(track_image_in_flight(&mut images_in_flight, 1, 2), None);
    }

    #[test]
    fn own_frame_slot_needs_no_extra_wait() {
        let mut images_in_flight = vec![None; 2];

        track_image_in_flight(&mut images_in_flight, 1, 0);
        // round robin brought frame slot 0 back to the same image
        assert_eq!(track_image_in_flight(&mut images_in_flight, 1, 0), None);
    }
}
