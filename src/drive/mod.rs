// Drive module for the four-wheel steered rover
//
// Provides:
// - Joystick -> pivot point mapping
// - Pivot -> per-wheel steering angle and speed (coordinated turn)

pub mod kinematics;

pub use kinematics::{
    compute_motion_vector, compute_pivot, motion_from_packet, MotionVector, PivotPoint, Wheel,
};
