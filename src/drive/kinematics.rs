// Four-wheel independent steering kinematics
// Converts joystick axes into a pivot point, then into per-wheel steering angles and speeds.
//
// Chassis frame: x to the right, y forward, origin at the chassis center.
// Wheel angles are in degrees, 0 = straight ahead, counter-clockwise positive.

use serde::Serialize;
use std::f32::consts::FRAC_PI_2;

use crate::config::SteeringConfig;
use crate::messages::ControlPacket;

/// Canonical wheel positions, in the order used by [`MotionVector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Wheel center in the chassis frame
    pub fn position(self, cfg: &SteeringConfig) -> (f32, f32) {
        let (x, y) = (cfg.half_track, cfg.half_wheelbase);
        match self {
            Wheel::FrontLeft => (-x, y),
            Wheel::FrontRight => (x, y),
            Wheel::BackLeft => (-x, -y),
            Wheel::BackRight => (x, -y),
        }
    }
}

/// Instantaneous center of rotation: `d` lateral, `h` longitudinal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PivotPoint {
    pub d: f32,
    pub h: f32,
}

/// Target steering angle (deg) and speed (throttle units) per wheel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotionVector {
    pub angles: [f32; 4],
    pub speeds: [f32; 4],
}

impl MotionVector {
    /// All wheels straight ahead at the same speed
    pub fn straight(speed: f32) -> Self {
        Self {
            angles: [0.0; 4],
            speeds: [speed; 4],
        }
    }

    pub fn angle(&self, wheel: Wheel) -> f32 {
        self.angles[wheel.index()]
    }

    pub fn speed(&self, wheel: Wheel) -> f32 {
        self.speeds[wheel.index()]
    }

    /// Angles for displays that count clockwise as positive
    pub fn display_angles(&self) -> [f32; 4] {
        self.angles.map(|a| -a)
    }
}

/// Map joystick axes to a pivot point.
///
/// A centered stick returns `d = 0`, which falls inside the minimum radius and
/// therefore drives straight. Small deflections put the pivot far away; full
/// deflection brings it in to `d_min`.
pub fn compute_pivot(joystick_x: i32, joystick_y: i32, cfg: &SteeringConfig) -> PivotPoint {
    let max = cfg.joystick_max.max(1) as f32;

    let d = if joystick_x == 0 {
        0.0
    } else {
        let nx = (joystick_x.unsigned_abs() as f32 / max).min(1.0);
        let curve = (nx * FRAC_PI_2 - FRAC_PI_2).tan().abs();
        let magnitude = (cfg.d_min + cfg.scale * curve).min(cfg.max_pivot_distance);
        magnitude.copysign(joystick_x as f32)
    };

    // Pushing forward moves the pivot behind the chassis
    let ny = (joystick_y as f32 / max).clamp(-1.0, 1.0);
    let reach = (d.abs() - cfg.d_min).max(0.0);
    let h = -ny * reach * cfg.max_steer_angle_deg.to_radians().tan();

    PivotPoint { d, h }
}

/// Compute wheel angles and speeds for a turn about `pivot`.
///
/// Every wheel is steered perpendicular to its radius from the pivot, and the
/// farthest wheel gets the full throttle so all wheels share one angular rate.
pub fn compute_motion_vector(
    packet: &ControlPacket,
    pivot: PivotPoint,
    cfg: &SteeringConfig,
) -> MotionVector {
    let throttle = packet.throttle as f32;

    // Inside the minimum radius steering saturates to straight ahead
    if pivot.d.abs() < cfg.d_min {
        return MotionVector::straight(throttle);
    }

    let mut distances = [0.0f32; 4];
    let mut directions = [1.0f32; 4];
    let mut angles = [0.0f32; 4];

    for wheel in Wheel::ALL {
        let i = wheel.index();
        let (wx, wy) = wheel.position(cfg);
        let rx = pivot.d - wx;
        let ry = pivot.h - wy;

        distances[i] = rx.hypot(ry);
        angles[i] = steering_angle(rx, ry);
        // Wheels on the far side of the pivot roll backwards (point turn)
        if rx * pivot.d < 0.0 {
            directions[i] = -1.0;
        }
    }

    let farthest = distances.iter().cloned().fold(0.0f32, f32::max);
    if farthest <= 0.0 {
        return MotionVector::straight(throttle);
    }

    let mut speeds = [0.0f32; 4];
    for i in 0..4 {
        speeds[i] = directions[i] * distances[i] / farthest * throttle;
    }

    MotionVector { angles, speeds }
}

/// Pivot and motion vector straight from a packet's stick axes
pub fn motion_from_packet(
    packet: &ControlPacket,
    cfg: &SteeringConfig,
) -> (PivotPoint, MotionVector) {
    let pivot = compute_pivot(packet.joystick_x, packet.joystick_y, cfg);
    (pivot, compute_motion_vector(packet, pivot, cfg))
}

/// Heading perpendicular to the vector (rx, ry), folded into (-90, 90] degrees
fn steering_angle(rx: f32, ry: f32) -> f32 {
    if rx == 0.0 {
        // Pivot straight ahead of or behind the wheel (or on it)
        return if ry == 0.0 { 0.0 } else { 90.0 };
    }
    let angle = (ry / rx).atan().to_degrees();
    if angle <= -90.0 { 90.0 } else { angle }
}

// Geometry checks use the default chassis: wheels at (+-10, +-12), d_min 15
#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn cfg() -> SteeringConfig {
        SteeringConfig::default()
    }

    fn packet(throttle: i32) -> ControlPacket {
        ControlPacket {
            throttle,
            ..Default::default()
        }
    }

    #[test]
    fn test_centered_stick_is_straight_ahead() {
        let pivot = compute_pivot(0, 0, &cfg());
        assert_eq!(pivot, PivotPoint { d: 0.0, h: 0.0 });

        let motion = compute_motion_vector(&packet(500), pivot, &cfg());
        assert_eq!(motion, MotionVector::straight(500.0));
    }

    #[test]
    fn test_full_deflection_reaches_min_radius() {
        let cfg = cfg();
        let right = compute_pivot(cfg.joystick_max, 0, &cfg);
        let left = compute_pivot(-cfg.joystick_max, 0, &cfg);
        assert!((right.d - cfg.d_min).abs() < EPS, "right d = {}", right.d);
        assert!((left.d + cfg.d_min).abs() < EPS, "left d = {}", left.d);
        assert_eq!(right.h, 0.0);
    }

    #[test]
    fn test_small_deflection_is_capped_far_away() {
        let cfg = cfg();
        let pivot = compute_pivot(1, 0, &cfg);
        assert_eq!(pivot.d, cfg.max_pivot_distance);
        let pivot = compute_pivot(-1, 0, &cfg);
        assert_eq!(pivot.d, -cfg.max_pivot_distance);
    }

    #[test]
    fn test_pivot_tightens_with_deflection() {
        let cfg = cfg();
        let mut last = f32::INFINITY;
        for step in 1..=10 {
            let x = cfg.joystick_max * step / 10;
            let d = compute_pivot(x, 0, &cfg).d;
            assert!(d <= last, "d should shrink: {} then {}", last, d);
            assert!(d >= cfg.d_min);
            last = d;
        }
    }

    #[test]
    fn test_push_forward_moves_pivot_behind() {
        let cfg = cfg();
        let x = cfg.joystick_max / 2;
        let forward = compute_pivot(x, cfg.joystick_max, &cfg);
        let back = compute_pivot(x, -cfg.joystick_max, &cfg);
        assert!(forward.h < 0.0);
        assert!((forward.h + back.h).abs() < EPS);

        let expected = (forward.d.abs() - cfg.d_min) * cfg.max_steer_angle_deg.to_radians().tan();
        assert!((forward.h.abs() - expected).abs() < EPS);
    }

    #[test]
    fn test_degenerate_pivot_zeroes_angles() {
        let cfg = cfg();
        for (d, h) in [(0.0, 0.0), (5.0, 40.0), (-14.9, -100.0)] {
            for throttle in [0, 300, 1023] {
                let motion = compute_motion_vector(&packet(throttle), PivotPoint { d, h }, &cfg);
                assert_eq!(motion.angles, [0.0; 4], "d={} h={}", d, h);
            }
        }
    }

    #[test]
    fn test_coordinated_turn_speeds() {
        let cfg = cfg();
        let throttle = 800;
        let pivots = [
            PivotPoint { d: 15.0, h: 0.0 },
            PivotPoint { d: -15.0, h: 0.0 },
            PivotPoint { d: 40.0, h: -20.0 },
            PivotPoint { d: -250.0, h: 30.0 },
            PivotPoint { d: 10_000.0, h: 0.0 },
        ];

        for pivot in pivots {
            let motion = compute_motion_vector(&packet(throttle), pivot, &cfg);
            let distances: Vec<f32> = Wheel::ALL
                .iter()
                .map(|w| {
                    let (x, y) = w.position(&cfg);
                    (pivot.d - x).hypot(pivot.h - y)
                })
                .collect();
            let farthest = distances.iter().cloned().fold(0.0f32, f32::max);

            assert!(
                motion.speeds.iter().any(|&s| s == throttle as f32),
                "farthest wheel must get full throttle: {:?}",
                motion.speeds
            );
            for (i, &speed) in motion.speeds.iter().enumerate() {
                assert!(speed <= throttle as f32);
                let expected = distances[i] / farthest * throttle as f32;
                assert!(
                    (speed.abs() - expected).abs() < EPS,
                    "wheel {} speed {} expected {}",
                    i,
                    speed,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_wheels_perpendicular_to_radius() {
        let cfg = cfg();
        let pivot = PivotPoint { d: 30.0, h: -8.0 };
        let motion = compute_motion_vector(&packet(100), pivot, &cfg);

        for wheel in Wheel::ALL {
            let (x, y) = wheel.position(&cfg);
            let (rx, ry) = (pivot.d - x, pivot.h - y);
            let theta = motion.angle(wheel).to_radians();
            // Heading vector for a CCW-from-forward angle
            let dot = -theta.sin() * rx + theta.cos() * ry;
            assert!(dot.abs() < EPS, "{:?} not perpendicular: {}", wheel, dot);
        }
    }

    #[test]
    fn test_right_turn_steers_front_right_rear_left() {
        let cfg = cfg();
        let motion = compute_motion_vector(&packet(100), PivotPoint { d: 20.0, h: 0.0 }, &cfg);
        println!("Right turn angles: {:?}", motion.angles);

        assert!(motion.angle(Wheel::FrontLeft) < 0.0);
        assert!(motion.angle(Wheel::FrontRight) < 0.0);
        assert!(motion.angle(Wheel::BackLeft) > 0.0);
        assert!(motion.angle(Wheel::BackRight) > 0.0);
        // Inner wheel steers harder
        assert!(motion.angle(Wheel::FrontRight) < motion.angle(Wheel::FrontLeft));
        // Outer wheels are farther from the pivot
        assert!(motion.speed(Wheel::FrontLeft) > motion.speed(Wheel::FrontRight));
    }

    #[test]
    fn test_left_right_mirror() {
        let cfg = cfg();
        let right = compute_motion_vector(&packet(100), PivotPoint { d: 25.0, h: 5.0 }, &cfg);
        let left = compute_motion_vector(&packet(100), PivotPoint { d: -25.0, h: 5.0 }, &cfg);

        let pairs = [
            (Wheel::FrontLeft, Wheel::FrontRight),
            (Wheel::BackLeft, Wheel::BackRight),
        ];
        for (a, b) in pairs {
            assert!((right.angle(a) + left.angle(b)).abs() < EPS);
            assert!((right.speed(a) - left.speed(b)).abs() < EPS);
        }
    }

    #[test]
    fn test_point_turn_reverses_far_side_wheels() {
        // Track wider than the minimum radius lets the pivot sit between the wheels
        let cfg = SteeringConfig {
            half_track: 20.0,
            d_min: 10.0,
            ..SteeringConfig::default()
        };
        let motion = compute_motion_vector(&packet(600), PivotPoint { d: 10.0, h: 0.0 }, &cfg);
        println!("Point turn speeds: {:?}", motion.speeds);

        assert_eq!(motion.speed(Wheel::FrontLeft), 600.0);
        assert!(motion.speed(Wheel::FrontRight) < 0.0);
        assert!(motion.speed(Wheel::BackRight) < 0.0);
        assert!(motion.speed(Wheel::BackLeft) > 0.0);
    }

    #[test]
    fn test_pivot_on_wheel_axis_points_sideways() {
        let cfg = cfg();
        // Pivot directly ahead of the front-right wheel
        let pivot = PivotPoint {
            d: cfg.half_track,
            h: 100.0,
        };
        let cfg = SteeringConfig { d_min: 1.0, ..cfg };
        let motion = compute_motion_vector(&packet(100), pivot, &cfg);
        assert_eq!(motion.angle(Wheel::FrontRight), 90.0);
    }

    #[test]
    fn test_motion_from_packet_full_right() {
        let cfg = cfg();
        let p = ControlPacket {
            throttle: 1000,
            joystick_x: cfg.joystick_max,
            ..Default::default()
        };
        let (pivot, motion) = motion_from_packet(&p, &cfg);
        assert!((pivot.d - cfg.d_min).abs() < EPS);
        assert!(motion.angle(Wheel::FrontRight) < -45.0);
        assert_eq!(motion.speeds.iter().cloned().fold(f32::MIN, f32::max), 1000.0);
    }

    #[test]
    fn test_display_angles_flip_sign() {
        let motion = MotionVector {
            angles: [10.0, -20.0, 0.0, 45.0],
            speeds: [0.0; 4],
        };
        assert_eq!(motion.display_angles(), [-10.0, 20.0, -0.0, -45.0]);
    }
}
