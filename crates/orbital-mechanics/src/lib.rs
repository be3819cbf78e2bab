//! Orbital Mechanics Library
//!
//! Circular-orbit propagation, coordinate transforms, and Walker Delta
//! constellation layout for LEO shells. Every position is a pure function of
//! immutable elements and simulated time, expressed in an Earth-centred
//! frame in metres.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Earth-centred cartesian vector in metres (or metres per second).
pub type Vec3 = Vector3<f64>;

/// Mean spherical Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Standard gravitational parameter of the Earth, m^3/s^2.
pub const GM_EARTH: f64 = 3.986004418e14;
/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrbitalError {
    #[error("Invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Invalid shell layout: {0}")]
    InvalidShell(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

// ============================================================================
// Circular orbit model
// ============================================================================

/// Fixed parameters of a circular orbit. Argument of perigee is zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrbitalElements {
    pub altitude_m: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub initial_phase_deg: f64,
}

impl Default for OrbitalElements {
    fn default() -> Self {
        Self {
            altitude_m: 550_000.0,
            inclination_deg: 53.0,
            raan_deg: 0.0,
            initial_phase_deg: 0.0,
        }
    }
}

impl OrbitalElements {
    pub fn new(altitude_m: f64, inclination_deg: f64, raan_deg: f64, initial_phase_deg: f64) -> Self {
        Self {
            altitude_m,
            inclination_deg,
            raan_deg,
            initial_phase_deg,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [
            self.altitude_m,
            self.inclination_deg,
            self.raan_deg,
            self.initial_phase_deg,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(OrbitalError::InvalidElements(format!(
                "non-finite element in {:?}",
                self
            )));
        }
        if self.altitude_m <= 0.0 {
            return Err(OrbitalError::InvalidElements(format!(
                "altitude must be positive, got {} m",
                self.altitude_m
            )));
        }
        Ok(())
    }

    /// Distance from the Earth's centre in metres.
    pub fn radius_m(&self) -> f64 {
        EARTH_RADIUS_M + self.altitude_m
    }

    /// Orbital speed in m/s.
    pub fn orbital_speed(&self) -> f64 {
        (GM_EARTH / self.radius_m()).sqrt()
    }

    /// Angular velocity in rad/s.
    pub fn angular_velocity(&self) -> f64 {
        self.orbital_speed() / self.radius_m()
    }

    /// Orbital period in seconds.
    pub fn period_s(&self) -> f64 {
        2.0 * PI / self.angular_velocity()
    }

    /// In-plane angle at `t_s` seconds of simulated time, in radians.
    pub fn phase_at(&self, t_s: f64) -> f64 {
        self.initial_phase_deg.to_radians() + self.angular_velocity() * t_s
    }

    pub fn position(&self, t_s: f64) -> Vec3 {
        let theta = self.phase_at(t_s);
        let r = self.radius_m();
        self.orientation() * Vec3::new(r * theta.cos(), r * theta.sin(), 0.0)
    }

    pub fn velocity(&self, t_s: f64) -> Vec3 {
        let theta = self.phase_at(t_s);
        let v = self.orbital_speed();
        self.orientation() * Vec3::new(-v * theta.sin(), v * theta.cos(), 0.0)
    }

    /// Inclination about the line of nodes, then RAAN about the polar axis.
    fn orientation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.raan_deg.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination_deg.to_radians())
    }
}

// ============================================================================
// Mobility
// ============================================================================

/// How a node's position evolves with simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mobility {
    Orbital(OrbitalElements),
    Fixed(Vec3),
}

impl Mobility {
    pub fn orbital(elements: OrbitalElements) -> Result<Self> {
        elements.validate()?;
        Ok(Mobility::Orbital(elements))
    }

    /// A point on the spherical Earth surface.
    pub fn ground(latitude: f64, longitude: f64) -> Result<Self> {
        Ok(Mobility::Fixed(transforms::geodetic_to_cartesian(latitude, longitude)?))
    }

    pub fn position(&self, t_s: f64) -> Vec3 {
        match self {
            Mobility::Orbital(elements) => elements.position(t_s),
            Mobility::Fixed(position) => *position,
        }
    }

    pub fn velocity(&self, t_s: f64) -> Vec3 {
        match self {
            Mobility::Orbital(elements) => elements.velocity(t_s),
            Mobility::Fixed(_) => Vec3::zeros(),
        }
    }

    pub fn distance_to(&self, other: &Mobility, t_s: f64) -> f64 {
        (self.position(t_s) - other.position(t_s)).norm()
    }

    pub fn is_orbital(&self) -> bool {
        matches!(self, Mobility::Orbital(_))
    }
}

// ============================================================================
// Coordinate transforms
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

pub mod transforms {
    use super::*;

    /// Spherical-Earth surface point for a latitude/longitude in degrees.
    pub fn geodetic_to_cartesian(latitude: f64, longitude: f64) -> Result<Vec3> {
        if !(-90.0..=90.0).contains(&latitude) || !latitude.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "latitude {} out of range",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) || !longitude.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "longitude {} out of range",
                longitude
            )));
        }

        let lat = latitude.to_radians();
        let lon = longitude.to_radians();
        Ok(Vec3::new(
            EARTH_RADIUS_M * lat.cos() * lon.cos(),
            EARTH_RADIUS_M * lat.cos() * lon.sin(),
            EARTH_RADIUS_M * lat.sin(),
        ))
    }

    pub fn cartesian_to_geodetic(position: &Vec3) -> GeodeticPosition {
        let horizontal = (position.x * position.x + position.y * position.y).sqrt();
        GeodeticPosition {
            latitude: position.z.atan2(horizontal).to_degrees(),
            longitude: position.y.atan2(position.x).to_degrees(),
            altitude_km: (position.norm() - EARTH_RADIUS_M) / 1000.0,
        }
    }
}

// ============================================================================
// Walker Delta layout
// ============================================================================

pub mod walker {
    use super::*;

    /// Minimum satellites per plane for a closed ring.
    pub const MIN_SATS_PER_PLANE: u32 = 3;

    /// Walker Delta i:T/P/F shell.
    ///
    /// Plane `p` sits at RAAN `p * 360 / P`. Satellite `s` in that plane
    /// starts at `s * 360 / N + F * 360 / T * p` where `N = T / P`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct WalkerDelta {
        pub total_satellites: u32,
        pub planes: u32,
        pub phasing: u32,
        pub altitude_m: f64,
        pub inclination_deg: f64,
    }

    impl Default for WalkerDelta {
        fn default() -> Self {
            Self::demo_shell()
        }
    }

    impl WalkerDelta {
        /// 4 planes of 8 satellites at 550 km, 53 degrees.
        pub fn demo_shell() -> Self {
            WalkerDelta {
                total_satellites: 32,
                planes: 4,
                phasing: 1,
                altitude_m: 550_000.0,
                inclination_deg: 53.0,
            }
        }

        /// A single ring of `satellites` evenly spaced satellites.
        pub fn single_plane(satellites: u32, altitude_m: f64, inclination_deg: f64) -> Self {
            WalkerDelta {
                total_satellites: satellites,
                planes: 1,
                phasing: 0,
                altitude_m,
                inclination_deg,
            }
        }

        pub fn validate(&self) -> Result<()> {
            if self.planes == 0 {
                return Err(OrbitalError::InvalidShell("plane count must be positive".into()));
            }
            if self.total_satellites % self.planes != 0 {
                return Err(OrbitalError::InvalidShell(format!(
                    "{} satellites do not divide evenly into {} planes",
                    self.total_satellites, self.planes
                )));
            }
            if self.satellites_per_plane() < MIN_SATS_PER_PLANE {
                return Err(OrbitalError::InvalidShell(format!(
                    "satellites per plane must be greater than 2, got {}",
                    self.satellites_per_plane()
                )));
            }
            OrbitalElements::new(self.altitude_m, self.inclination_deg, 0.0, 0.0).validate()
        }

        pub fn satellites_per_plane(&self) -> u32 {
            self.total_satellites / self.planes.max(1)
        }

        pub fn plane_spacing_deg(&self) -> f64 {
            360.0 / self.planes as f64
        }

        pub fn in_plane_spacing_deg(&self) -> f64 {
            360.0 / self.satellites_per_plane() as f64
        }

        /// Phase offset between adjacent planes.
        pub fn phase_offset_deg(&self) -> f64 {
            self.phasing as f64 * 360.0 / self.total_satellites as f64
        }

        /// Elements for every satellite, grouped by plane and ordered by slot.
        pub fn elements(&self) -> Result<Vec<Vec<OrbitalElements>>> {
            self.validate()?;

            let per_plane = self.satellites_per_plane();
            let planes = (0..self.planes)
                .map(|p| {
                    let raan = p as f64 * self.plane_spacing_deg();
                    let offset = p as f64 * self.phase_offset_deg();
                    (0..per_plane)
                        .map(|s| {
                            let phase = (s as f64 * self.in_plane_spacing_deg() + offset) % 360.0;
                            OrbitalElements::new(self.altitude_m, self.inclination_deg, raan, phase)
                        })
                        .collect()
                })
                .collect();
            Ok(planes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_test_elements() -> OrbitalElements {
        OrbitalElements::new(550_000.0, 53.0, 30.0, 45.0)
    }

    #[test]
    fn test_period_matches_kepler() {
        let elements = create_test_elements();
        let r = elements.radius_m();
        let expected = 2.0 * PI * (r * r * r / GM_EARTH).sqrt();
        assert!((elements.period_s() - expected).abs() < 1e-6);
        // 550 km LEO is roughly a 95 minute orbit
        assert!((elements.period_s() / 60.0 - 95.6).abs() < 0.5);
    }

    #[test]
    fn test_equatorial_position_at_epoch() {
        let elements = OrbitalElements::new(700_000.0, 0.0, 0.0, 0.0);
        let position = elements.position(0.0);
        assert!((position.x - (EARTH_RADIUS_M + 700_000.0)).abs() < 1e-6);
        assert!(position.y.abs() < 1e-6);
        assert!(position.z.abs() < 1e-6);
    }

    #[test]
    fn test_polar_orbit_reaches_pole() {
        let elements = OrbitalElements::new(550_000.0, 90.0, 0.0, 90.0);
        let position = elements.position(0.0);
        assert!((position.z - elements.radius_m()).abs() < 1e-3);
    }

    #[test]
    fn test_raan_rotates_line_of_nodes() {
        let elements = OrbitalElements::new(550_000.0, 53.0, 90.0, 0.0);
        let position = elements.position(0.0);
        // Ascending node now lies on the +y axis
        assert!(position.x.abs() < 1e-3);
        assert!((position.y - elements.radius_m()).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_elements_rejected() {
        assert!(OrbitalElements::new(-1.0, 53.0, 0.0, 0.0).validate().is_err());
        assert!(OrbitalElements::new(f64::NAN, 53.0, 0.0, 0.0).validate().is_err());
        assert!(Mobility::orbital(OrbitalElements::new(0.0, 0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_ground_position_on_surface() {
        let mobility = Mobility::ground(48.85, 2.35).unwrap();
        let position = mobility.position(1234.0);
        assert!((position.norm() - EARTH_RADIUS_M).abs() < 1e-6);
        assert_eq!(mobility.velocity(10.0), Vec3::zeros());
        assert!(!mobility.is_orbital());
    }

    #[test]
    fn test_geodetic_round_trip() {
        let position = transforms::geodetic_to_cartesian(-33.9, 18.4).unwrap();
        let geodetic = transforms::cartesian_to_geodetic(&position);
        assert!((geodetic.latitude + 33.9).abs() < 1e-9);
        assert!((geodetic.longitude - 18.4).abs() < 1e-9);
        assert!(geodetic.altitude_km.abs() < 1e-9);
    }

    #[test]
    fn test_invalid_coordinates() {
        assert!(transforms::geodetic_to_cartesian(91.0, 0.0).is_err());
        assert!(transforms::geodetic_to_cartesian(0.0, -181.0).is_err());
    }

    #[test]
    fn test_walker_layout() {
        let shell = walker::WalkerDelta::demo_shell();
        let planes = shell.elements().unwrap();
        assert_eq!(planes.len(), 4);
        assert!(planes.iter().all(|p| p.len() == 8));
        assert_eq!(planes[1][0].raan_deg, 90.0);
        assert_eq!(planes[0][1].initial_phase_deg, 45.0);
        // F = 1 shifts each plane by 360 / 32
        assert!((planes[2][0].initial_phase_deg - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_walker_rejects_small_planes() {
        let shell = walker::WalkerDelta::single_plane(2, 550_000.0, 53.0);
        assert!(matches!(shell.validate(), Err(OrbitalError::InvalidShell(_))));

        let uneven = walker::WalkerDelta {
            total_satellites: 10,
            planes: 3,
            ..walker::WalkerDelta::demo_shell()
        };
        assert!(uneven.elements().is_err());
    }

    fn elements_strategy() -> impl Strategy<Value = OrbitalElements> {
        (300_000.0..2_000_000.0f64, 0.0..180.0f64, 0.0..360.0f64, 0.0..360.0f64)
            .prop_map(|(alt, inc, raan, phase)| OrbitalElements::new(alt, inc, raan, phase))
    }

    proptest! {
        #[test]
        fn prop_position_is_periodic(elements in elements_strategy(), t in 0.0..86_400.0f64) {
            let a = elements.position(t);
            let b = elements.position(t + elements.period_s());
            prop_assert!((a - b).norm() < 1e-3);
        }

        #[test]
        fn prop_radius_is_constant(elements in elements_strategy(), t in 0.0..86_400.0f64) {
            prop_assert!((elements.position(t).norm() - elements.radius_m()).abs() < 1e-3);
        }

        #[test]
        fn prop_velocity_matches_numerical_derivative(
            elements in elements_strategy(),
            t in 1.0..86_400.0f64,
        ) {
            let h = 1e-3;
            let numerical = (elements.position(t + h) - elements.position(t - h)) / (2.0 * h);
            prop_assert!((numerical - elements.velocity(t)).norm() < 1e-2);
        }

        #[test]
        fn prop_ground_points_lie_on_sphere(lat in -90.0..=90.0f64, lon in -180.0..=180.0f64) {
            let position = transforms::geodetic_to_cartesian(lat, lon).unwrap();
            prop_assert!((position.norm() - EARTH_RADIUS_M).abs() < 1e-6);
        }
    }
}
