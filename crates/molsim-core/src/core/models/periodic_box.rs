use super::system::SystemError;
use nalgebra::Vector3;

/// Periodic boundary box described by three edge vectors in reduced triclinic form.
///
/// The reduced form requires `a = (ax, 0, 0)`, `b = (bx, by, 0)` and `c = (cx, cy, cz)`
/// with positive diagonal entries and off-diagonal components no larger than half of the
/// corresponding diagonal. This is the form under which the simple sequential
/// minimum-image reduction in [`PeriodicBox::minimum_image`] is exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    a: Vector3<f64>,
    b: Vector3<f64>,
    c: Vector3<f64>,
}

impl PeriodicBox {
    /// Creates a box from three edge vectors.
    ///
    /// # Arguments
    ///
    /// * `a`, `b`, `c` - Edge vectors in nanometers, in reduced triclinic form.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::InvalidParameter`] if the vectors are not finite or not in
    /// reduced form.
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Result<Self, SystemError> {
        let invalid = |reason: &str| SystemError::InvalidParameter {
            name: "periodic_box",
            reason: reason.to_string(),
        };

        if !(a.iter().chain(b.iter()).chain(c.iter())).all(|v| v.is_finite()) {
            return Err(invalid("box vectors must be finite"));
        }
        if a.y != 0.0 || a.z != 0.0 || b.z != 0.0 {
            return Err(invalid(
                "first vector must lie on the x axis and second in the xy plane",
            ));
        }
        if a.x <= 0.0 || b.y <= 0.0 || c.z <= 0.0 {
            return Err(invalid("box vectors must have positive diagonal components"));
        }
        if b.x.abs() > 0.5 * a.x || c.x.abs() > 0.5 * a.x || c.y.abs() > 0.5 * b.y {
            return Err(invalid("box vectors are not in reduced form"));
        }

        Ok(Self { a, b, c })
    }

    /// Creates a rectangular box with the given edge lengths.
    pub fn rectangular(x: f64, y: f64, z: f64) -> Result<Self, SystemError> {
        Self::new(
            Vector3::new(x, 0.0, 0.0),
            Vector3::new(0.0, y, 0.0),
            Vector3::new(0.0, 0.0, z),
        )
    }

    /// Returns the three edge vectors `[a, b, c]`.
    pub fn vectors(&self) -> [Vector3<f64>; 3] {
        [self.a, self.b, self.c]
    }

    /// Volume of the box in nm³.
    pub fn volume(&self) -> f64 {
        self.a.x * self.b.y * self.c.z
    }

    /// Shortest distance between two opposite faces, which bounds any usable cutoff.
    pub fn min_face_distance(&self) -> f64 {
        self.a.x.min(self.b.y).min(self.c.z)
    }

    /// Maps a displacement vector onto its nearest periodic image.
    #[inline]
    pub fn minimum_image(&self, delta: Vector3<f64>) -> Vector3<f64> {
        let mut d = delta;
        d -= self.c * (d.z / self.c.z).round();
        d -= self.b * (d.y / self.b.y).round();
        d -= self.a * (d.x / self.a.x).round();
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn rectangular_box_reports_volume_and_vectors() {
        let pbox = PeriodicBox::rectangular(2.0, 3.0, 4.0).unwrap();
        assert!((pbox.volume() - 24.0).abs() < TOLERANCE);
        assert_eq!(pbox.vectors()[1], Vector3::new(0.0, 3.0, 0.0));
        assert_eq!(pbox.min_face_distance(), 2.0);
    }

    #[test]
    fn minimum_image_wraps_displacements_into_the_nearest_cell() {
        let pbox = PeriodicBox::rectangular(2.0, 2.0, 2.0).unwrap();
        let wrapped = pbox.minimum_image(Vector3::new(1.5, -1.7, 0.3));
        assert!((wrapped - Vector3::new(-0.5, 0.3, 0.3)).norm() < TOLERANCE);
    }

    #[test]
    fn minimum_image_handles_triclinic_boxes() {
        let pbox = PeriodicBox::new(
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.5, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        )
        .unwrap();
        let wrapped = pbox.minimum_image(Vector3::new(0.5, 2.0, 0.0));
        assert!(wrapped.norm() < TOLERANCE);
    }

    #[test]
    fn new_rejects_vectors_outside_reduced_form() {
        let result = PeriodicBox::new(
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(1.5, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
        );
        assert!(matches!(result, Err(SystemError::InvalidParameter { .. })));
    }

    #[test]
    fn new_rejects_non_positive_edges() {
        assert!(PeriodicBox::rectangular(0.0, 1.0, 1.0).is_err());
        assert!(PeriodicBox::rectangular(1.0, f64::NAN, 1.0).is_err());
    }
}
