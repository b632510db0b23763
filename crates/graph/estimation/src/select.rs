use framegraph_types::{BoundingBox, Sphere, Transform};

/// Spatial predicate applied to estimated poses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Region {
    Box(BoundingBox),
    Sphere(Sphere),
}

impl Region {
    /// Whether the origin of `pose` lies inside the region. Only the mean
    /// pose is considered, not its uncertainty.
    pub fn contains(&self, pose: &Transform) -> bool {
        let p = pose.translation();
        match self {
            Region::Box(b) => b.contains(&p),
            Region::Sphere(s) => s.contains(&p),
        }
    }
}

impl From<BoundingBox> for Region {
    fn from(b: BoundingBox) -> Self {
        Region::Box(b)
    }
}

impl From<Sphere> for Region {
    fn from(s: Sphere) -> Self {
        Region::Sphere(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_and_sphere_membership() {
        let inside = Transform::from_translation(0.5, 0.5, 0.5);
        let outside = Transform::from_translation(3.0, 0.0, 0.0);

        let b: Region = BoundingBox::from_corners([1.0, 1.0, 1.0], [0.0, 0.0, 0.0]).into();
        assert!(b.contains(&inside));
        assert!(!b.contains(&outside));

        let s: Region = Sphere::new([0.0, 0.0, 0.0], 1.0).into();
        assert!(s.contains(&inside));
        assert!(!s.contains(&outside));
    }
}
