//! Turns decoded telemetry samples into ball motion: direct horizontal
//! placement, edge-triggered jump, and a manual ground bounce.

use glam::Vec3;
use tiltball_telemetry::TelemetrySample;

/// Upward speed below which the body still counts as resting on the ground.
const GROUNDED_VELOCITY_THRESHOLD: f32 = 0.05;
/// Downward speed beyond which ground contact triggers a bounce.
const DESCENT_VELOCITY_THRESHOLD: f32 = -0.01;

// --- Parameters ---

#[derive(Debug, Clone)]
pub struct MotionParams {
    /// Initial upward speed applied on a jump trigger.
    pub jump_velocity: f32,
    /// Fraction of vertical speed preserved (sign-flipped) after a bounce,
    /// in [0, 1].
    pub ground_restitution: f32,
    /// Tolerance band around the resting height within which the body is
    /// considered grounded.
    pub ground_epsilon: f32,
    /// Multiplier applied to both telemetry axes before placement.
    pub axis_scale: f32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            jump_velocity: 6.0,
            ground_restitution: 0.8,
            ground_epsilon: 0.05,
            axis_scale: 1.0,
        }
    }
}

// --- Body access ---

/// Read-write access to the physics body, owned by the host. The controller
/// never integrates horizontal motion; it only places the body and adjusts
/// its vertical velocity.
pub trait Body {
    fn position(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);
    fn vertical_velocity(&self) -> f32;
    fn set_vertical_velocity(&mut self, velocity: f32);
}

/// Free-standing body for hosts without a physics engine of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct PointBody {
    pub position: Vec3,
    pub vertical_velocity: f32,
}

impl PointBody {
    pub fn new(position: Vec3) -> Self {
        Self { position, vertical_velocity: 0.0 }
    }

    /// Vertical free-fall step. The horizontal plane is telemetry-driven
    /// and carries no inertia, so only the vertical axis integrates.
    pub fn integrate(&mut self, gravity: f32, dt: f32) {
        self.vertical_velocity -= gravity * dt;
        self.position.y += self.vertical_velocity * dt;
    }
}

impl Body for PointBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    fn set_vertical_velocity(&mut self, velocity: f32) {
        self.vertical_velocity = velocity;
    }
}

// --- Controller ---

/// Applies one telemetry sample per fixed simulation tick. Keeps the only
/// cross-tick state in the pipeline: the previous jump-button level and the
/// ground reference height.
pub struct MotionController {
    params: MotionParams,
    ground_height: Option<f32>,
    last_jump_pressed: bool,
}

impl MotionController {
    /// `ground_height` of `None` derives the ground from the body's height
    /// on the first tick; once resolved it never changes.
    pub fn new(params: MotionParams, ground_height: Option<f32>) -> Self {
        Self {
            params,
            ground_height,
            last_jump_pressed: false,
        }
    }

    pub fn ground_height(&self) -> Option<f32> {
        self.ground_height
    }

    pub fn is_grounded(&self, body: &dyn Body) -> bool {
        let ground = match self.ground_height {
            Some(ground) => ground,
            None => return false,
        };
        (body.position().y - ground).abs() <= self.params.ground_epsilon
            && body.vertical_velocity() <= GROUNDED_VELOCITY_THRESHOLD
    }

    /// One fixed-duration simulation step. Assumes a well-formed sample;
    /// malformed lines are filtered upstream by the decoder.
    pub fn tick(&mut self, body: &mut dyn Body, sample: &TelemetrySample) {
        let ground = *self
            .ground_height
            .get_or_insert_with(|| body.position().y);

        // Telemetry drives the horizontal plane only: x maps to world X,
        // y to world Z. The vertical coordinate belongs to jump/bounce.
        let position = body.position();
        body.set_position(Vec3::new(
            sample.x * self.params.axis_scale,
            position.y,
            sample.y * self.params.axis_scale,
        ));

        let grounded = self.is_grounded(body);

        // Jump on the rising edge of the button, and only from the ground.
        // Holding the button does not re-trigger.
        let mut jumped = false;
        if sample.jump_pressed && !self.last_jump_pressed && grounded {
            body.set_vertical_velocity(self.params.jump_velocity);
            jumped = true;
        }
        self.last_jump_pressed = sample.jump_pressed;

        // Ground contact: clamp to the ground plane and reflect the
        // vertical velocity. A jump this tick leaves the body moving
        // upward, so contact handling is skipped for that tick.
        if !jumped {
            let position = body.position();
            let vy = body.vertical_velocity();
            if position.y <= ground + self.params.ground_epsilon
                && vy < DESCENT_VELOCITY_THRESHOLD
            {
                body.set_position(Vec3::new(position.x, ground, position.z));
                body.set_vertical_velocity(-vy * self.params.ground_restitution);
            }
        }
    }
}
