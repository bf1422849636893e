use glam::{vec2, Vec2};
use winit::event::{DeviceEvent, ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Per frame input state, deltas are accumulated between [`Self::reset`]
/// calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Controls {
    pub left_click: bool,
    pub cursor_delta: Vec2,
    pub scroll_delta: f32,
}

impl Controls {
    pub fn reset(&mut self) {
        self.cursor_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.left_click = *state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel {
                delta: MouseScrollDelta::LineDelta(_, vertical),
                ..
            } => {
                self.scroll_delta += vertical;
            }
            _ => {}
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (x, y) } = event {
            self.cursor_delta += vec2(*x as f32, *y as f32);
        }
    }
}
