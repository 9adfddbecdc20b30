use approx::assert_abs_diff_eq;
use synaero::core::{Axis, LookupTable};
use synaero::AerosolError;

fn table(axes: Vec<Vec<f64>>, values: Vec<f64>) -> LookupTable {
    LookupTable::new(axes.into_iter().map(|a| Axis::new(a).unwrap()).collect(), values).unwrap()
}

#[test]
fn test_one_dimensional_identity() {
    let lut = table(vec![vec![0.0, 1.0]], vec![0.0, 1.0]);
    assert_abs_diff_eq!(lut.evaluate(&[0.5]).unwrap(), 0.5, epsilon = 1e-15);
    assert_abs_diff_eq!(lut.evaluate(&[0.12345]).unwrap(), 0.12345, epsilon = 1e-15);
}

#[test]
fn test_two_dimensional_row_major() {
    let lut = table(vec![vec![0.0, 1.0], vec![0.0, 1.0]], vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(lut.evaluate(&[0.0, 0.0]).unwrap(), 0.0);
    assert_eq!(lut.evaluate(&[1.0, 1.0]).unwrap(), 3.0);
    assert_eq!(lut.evaluate(&[1.0, 0.0]).unwrap(), 2.0);
    assert_abs_diff_eq!(lut.evaluate(&[0.5, 0.5]).unwrap(), 1.5, epsilon = 1e-15);
}

#[test]
fn test_exact_at_nodes_and_midpoints_irregular_axis() {
    let xs = vec![-2.0, -0.5, 0.1, 3.0, 10.0];
    let ys: Vec<f64> = xs.iter().map(|x| 4.0 * x - 1.0).collect();
    let lut = table(vec![xs.clone()], ys.clone());

    for (x, y) in xs.iter().zip(&ys) {
        assert_eq!(lut.evaluate(&[*x]).unwrap(), *y);
    }
    for i in 0..xs.len() - 1 {
        let mid = 0.5 * (xs[i] + xs[i + 1]);
        assert_abs_diff_eq!(lut.evaluate(&[mid]).unwrap(), 0.5 * (ys[i] + ys[i + 1]), epsilon = 1e-12);
    }
}

#[test]
fn test_continuity_at_interior_node() {
    let lut = table(
        vec![vec![0.0, 1.0, 2.0], vec![0.0, 0.5, 3.0]],
        vec![0.0, 2.0, -1.0, 5.0, 1.0, 4.0, 2.0, 8.0, 0.5],
    );
    let node = lut.evaluate(&[1.0, 0.5]).unwrap();
    assert_eq!(node, 1.0);
    for eps in [1e-3, 1e-6, 1e-9] {
        assert_abs_diff_eq!(lut.evaluate(&[1.0 - eps, 0.5 + eps]).unwrap(), node, epsilon = 20.0 * eps);
        assert_abs_diff_eq!(lut.evaluate(&[1.0 + eps, 0.5 - eps]).unwrap(), node, epsilon = 20.0 * eps);
    }
}

#[test]
fn test_clamping_matches_boundary() {
    let lut = table(
        vec![vec![0.0, 1.0, 4.0], vec![10.0, 20.0]],
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0],
    );
    assert_eq!(lut.evaluate(&[-3.0, 15.0]).unwrap(), lut.evaluate(&[0.0, 15.0]).unwrap());
    assert_eq!(lut.evaluate(&[9.0, 25.0]).unwrap(), lut.evaluate(&[4.0, 20.0]).unwrap());
    assert_eq!(lut.evaluate(&[2.0, -100.0]).unwrap(), lut.evaluate(&[2.0, 10.0]).unwrap());
}

#[test]
fn test_descending_axis() {
    let ascending = table(vec![vec![-1100.0, -800.0, -500.0]], vec![3.0, 2.0, 1.0]);
    let descending = table(vec![vec![1100.0, 800.0, 500.0]], vec![3.0, 2.0, 1.0]);
    for p in [500.0, 650.0, 900.0, 1013.25, 1100.0] {
        assert_abs_diff_eq!(
            descending.evaluate(&[p]).unwrap(),
            ascending.evaluate(&[-p]).unwrap(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_trilinear_matches_closed_form() {
    let axes = vec![vec![0.0, 1.0, 3.0], vec![-1.0, 2.0], vec![0.0, 0.25, 0.5, 1.0]];
    let f = |x: f64, y: f64, z: f64| 1.0 + 2.0 * x - 0.5 * y + 3.0 * z;
    let mut values = Vec::new();
    for &x in &axes[0] {
        for &y in &axes[1] {
            for &z in &axes[2] {
                values.push(f(x, y, z));
            }
        }
    }
    let lut = table(axes, values);
    for &(x, y, z) in &[(0.3, 0.0, 0.1), (2.5, 1.9, 0.75), (1.0, -1.0, 0.6)] {
        assert_abs_diff_eq!(lut.evaluate(&[x, y, z]).unwrap(), f(x, y, z), epsilon = 1e-12);
    }
}

#[test]
fn test_all_degenerate_axes_return_single_value() {
    let lut = table(vec![vec![5.0], vec![1.0], vec![-2.0]], vec![42.0]);
    assert_eq!(lut.evaluate(&[0.0, 100.0, 7.0]).unwrap(), 42.0);
}

#[test]
fn test_degenerate_axis_mixed_with_regular() {
    let lut = table(vec![vec![0.0, 1.0], vec![3.0]], vec![10.0, 20.0]);
    assert_abs_diff_eq!(lut.evaluate(&[0.25, -9.0]).unwrap(), 12.5, epsilon = 1e-12);
}

#[test]
fn test_construction_errors() {
    let axes = vec![Axis::new(vec![0.0, 1.0]).unwrap(), Axis::new(vec![0.0, 1.0, 2.0]).unwrap()];
    assert!(matches!(
        LookupTable::new(axes, vec![0.0; 5]),
        Err(AerosolError::Configuration(_))
    ));
    assert!(Axis::new(vec![]).is_err());
    assert!(Axis::new(vec![0.0, 1.0, 1.0]).is_err());
    assert!(Axis::new(vec![0.0, f64::NAN]).is_err());

    let lut = table(vec![vec![0.0, 1.0]], vec![0.0, 1.0]);
    assert!(lut.evaluate(&[0.5, 0.5]).is_err());
}

#[test]
fn test_repeated_queries_are_stable() {
    let lut = table(vec![vec![0.0, 1.0, 2.0], vec![0.0, 1.0]], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let first = lut.evaluate(&[1.3, 0.7]).unwrap();
    for _ in 0..1000 {
        assert_eq!(lut.evaluate(&[1.3, 0.7]).unwrap(), first);
    }
}
