//! # Input
//!
//! Window-system-neutral input events and the state they accumulate into.
//! The viewer translates its windowing library's events into [`InputEvent`]
//! and [`WindowEvent`]; everything downstream is plain data.
//!
//! [`InputState::apply`] is a pure fold: it takes a state and an event and
//! returns the next state. Per-frame deltas (cursor motion, wheel) accumulate
//! until [`InputState::end_frame`] clears them.

/// Camera movement directions bound to keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    /// Strafe left
    Left,
    /// Strafe right
    Right,
    /// Move along the view direction
    Forward,
    /// Move against the view direction
    Backward,
}

/// Mouse buttons the camera cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Secondary button; dragging with it rotates the camera
    Right,
    /// Anything else
    Other,
}

/// Input delivered to the scene camera (or consumed by the overlay first)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Movement key pressed or released
    Key {
        /// Bound direction
        direction: MoveDirection,
        /// `true` on press, `false` on release
        pressed: bool,
    },
    /// Mouse button pressed or released
    MouseButton {
        /// Which button
        button: MouseButton,
        /// `true` on press
        pressed: bool,
    },
    /// Cursor moved to an absolute window position
    CursorMoved {
        /// Horizontal position in pixels
        x: f64,
        /// Vertical position in pixels
        y: f64,
    },
    /// Vertical wheel movement in notches
    Scroll {
        /// Positive away from the user
        delta: f32,
    },
}

/// Window lifecycle events the renderer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Framebuffer changed size
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
    /// Window iconified; rendering pauses
    Minimized,
    /// Window restored from iconified
    Restored,
    /// User asked to close the window
    CloseRequested,
}

/// Accumulated input for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    /// Strafe left held
    pub move_left: bool,
    /// Strafe right held
    pub move_right: bool,
    /// Forward held
    pub move_forward: bool,
    /// Backward held
    pub move_backward: bool,
    /// Right mouse button held
    pub right_button_down: bool,
    /// Last known cursor position
    pub cursor: Option<(f64, f64)>,
    /// Cursor motion while dragging, since the last `end_frame`
    pub drag_delta: (f32, f32),
    /// Wheel notches since the last `end_frame`
    pub wheel_delta: f32,
}

impl InputState {
    /// Next state after `event`
    #[must_use]
    pub fn apply(self, event: &InputEvent) -> Self {
        let mut next = self;
        match *event {
            InputEvent::Key { direction, pressed } => match direction {
                MoveDirection::Left => next.move_left = pressed,
                MoveDirection::Right => next.move_right = pressed,
                MoveDirection::Forward => next.move_forward = pressed,
                MoveDirection::Backward => next.move_backward = pressed,
            },
            InputEvent::MouseButton { button: MouseButton::Right, pressed } => {
                next.right_button_down = pressed;
            }
            InputEvent::MouseButton { .. } => {}
            InputEvent::CursorMoved { x, y } => {
                if let (Some((last_x, last_y)), true) = (self.cursor, self.right_button_down) {
                    next.drag_delta.0 += (x - last_x) as f32;
                    next.drag_delta.1 += (y - last_y) as f32;
                }
                next.cursor = Some((x, y));
            }
            InputEvent::Scroll { delta } => next.wheel_delta += delta,
        }
        next
    }

    /// Same held keys and buttons, deltas cleared
    #[must_use]
    pub fn end_frame(self) -> Self {
        Self {
            drag_delta: (0.0, 0.0),
            wheel_delta: 0.0,
            ..self
        }
    }

    /// Movement intent as (right, forward) axes in `{-1, 0, 1}`
    pub fn movement_axes(&self) -> (f32, f32) {
        let axis = |positive: bool, negative: bool| f32::from(u8::from(positive)) - f32::from(u8::from(negative));
        (
            axis(self.move_right, self.move_left),
            axis(self.move_forward, self.move_backward),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fold(events: &[InputEvent]) -> InputState {
        events.iter().fold(InputState::default(), |state, event| state.apply(event))
    }

    #[test]
    fn test_keys_toggle_movement() {
        let state = fold(&[
            InputEvent::Key { direction: MoveDirection::Forward, pressed: true },
            InputEvent::Key { direction: MoveDirection::Left, pressed: true },
            InputEvent::Key { direction: MoveDirection::Left, pressed: false },
        ]);
        assert!(state.move_forward);
        assert!(!state.move_left);
        assert_eq!(state.movement_axes(), (0.0, 1.0));
    }

    #[test]
    fn test_cursor_motion_only_counts_while_dragging() {
        let state = fold(&[
            InputEvent::CursorMoved { x: 10.0, y: 10.0 },
            InputEvent::CursorMoved { x: 20.0, y: 30.0 },
            InputEvent::MouseButton { button: MouseButton::Right, pressed: true },
            InputEvent::CursorMoved { x: 25.0, y: 20.0 },
            InputEvent::CursorMoved { x: 27.0, y: 21.0 },
        ]);
        assert_relative_eq!(state.drag_delta.0, 7.0);
        assert_relative_eq!(state.drag_delta.1, -9.0);

        let released = state
            .apply(&InputEvent::MouseButton { button: MouseButton::Right, pressed: false })
            .end_frame()
            .apply(&InputEvent::CursorMoved { x: 100.0, y: 100.0 });
        assert_eq!(released.drag_delta, (0.0, 0.0));
        assert_eq!(released.cursor, Some((100.0, 100.0)));
    }

    #[test]
    fn test_end_frame_keeps_held_state() {
        let state = fold(&[
            InputEvent::Key { direction: MoveDirection::Backward, pressed: true },
            InputEvent::Scroll { delta: 1.5 },
            InputEvent::Scroll { delta: 1.0 },
        ]);
        assert_relative_eq!(state.wheel_delta, 2.5);

        let next = state.end_frame();
        assert!(next.move_backward);
        assert_relative_eq!(next.wheel_delta, 0.0);
    }

    #[test]
    fn test_other_buttons_are_ignored() {
        let state = fold(&[InputEvent::MouseButton { button: MouseButton::Left, pressed: true }]);
        assert_eq!(state, InputState::default());
    }
}
