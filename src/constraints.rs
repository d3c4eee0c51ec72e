use nalgebra::DVector;
use std::collections::BTreeMap;

/// Distance constraints keyed by atom pair `(i, j)` with `i < j`, in Angstrom.
pub type DistanceConstraints = BTreeMap<(usize, usize), f64>;

pub fn evaluate_bond(coords: &DVector<f64>, a: usize, b: usize) -> f64 {
    let i = a * 3;
    let j = b * 3;
    let dx = coords[j] - coords[i];
    let dy = coords[j + 1] - coords[i + 1];
    let dz = coords[j + 2] - coords[i + 2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Compute gradient of bond constraint: dR/dx
///
/// Dotting a Cartesian displacement with this vector gives the first-order
/// change in the a-b distance along that displacement.
pub fn bond_gradient(coords: &DVector<f64>, a: usize, b: usize) -> DVector<f64> {
    let mut grad = DVector::zeros(coords.len());

    let i = a * 3;
    let j = b * 3;

    let dx = coords[j] - coords[i];
    let dy = coords[j + 1] - coords[i + 1];
    let dz = coords[j + 2] - coords[i + 2];
    let r = (dx * dx + dy * dy + dz * dz).sqrt();

    if r > 1e-10 {
        grad[i] = -dx / r;
        grad[i + 1] = -dy / r;
        grad[i + 2] = -dz / r;

        grad[j] = dx / r;
        grad[j + 1] = dy / r;
        grad[j + 2] = dz / r;
    }

    grad
}

/// Largest absolute deviation of any constrained distance from its target.
pub fn max_violation(coords: &DVector<f64>, constraints: &DistanceConstraints) -> f64 {
    constraints
        .iter()
        .map(|(&(a, b), &target)| (evaluate_bond(coords, a, b) - target).abs())
        .fold(0.0, f64::max)
}

/// True when every constrained distance is within `tolerance` of its target.
pub fn constraints_met(coords: &DVector<f64>, constraints: &DistanceConstraints, tolerance: f64) -> bool {
    max_violation(coords, constraints) < tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_h3() -> DVector<f64> {
        DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.5, 0.0, 0.0])
    }

    #[test]
    fn test_bond_gradient_projects_stretch() {
        let coords = linear_h3();
        let grad = bond_gradient(&coords, 0, 1);
        // pull the atoms apart along x
        let stretch = DVector::from_vec(vec![-0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((grad.dot(&stretch) - 1.0).abs() < 1e-12);
        assert_eq!(grad[6], 0.0);
    }

    #[test]
    fn test_constraint_violation() {
        let coords = linear_h3();
        let mut constraints = DistanceConstraints::new();
        constraints.insert((0, 1), 1.0);
        constraints.insert((1, 2), 1.4);
        assert!((max_violation(&coords, &constraints) - 0.1).abs() < 1e-12);
        assert!(constraints_met(&coords, &constraints, 0.2));
        assert!(!constraints_met(&coords, &constraints, 0.05));
    }
}
