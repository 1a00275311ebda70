use std::f64::consts::PI;

use tunemap::sweep::feature::{Feature, FeatureSpace, FeatureSpec};

#[test]
fn declaration_order_fixes_the_sweep_order() {
    let a = FeatureSpec::listed("a", vec![1.0, 2.0]).resolve().unwrap();
    let b = FeatureSpec::listed("b", vec![10.0, 20.0]).resolve().unwrap();
    let space = FeatureSpace::new(vec![a, b]);

    assert_eq!(space.permutation_count(), 4);
    let perms: Vec<Vec<f64>> = space.permutations().collect();
    assert_eq!(
        perms,
        vec![
            vec![1.0, 10.0],
            vec![1.0, 20.0],
            vec![2.0, 10.0],
            vec![2.0, 20.0],
        ]
    );
}

#[test]
fn enumeration_is_repeatable() {
    let a = FeatureSpec::stepped("x", 0.0, 1.0, 0.5).resolve().unwrap();
    let b = FeatureSpec::listed("y", vec![3.0]).resolve().unwrap();
    let space = FeatureSpace::new(vec![a, b]);
    let first: Vec<Vec<f64>> = space.permutations().collect();
    let second: Vec<Vec<f64>> = space.permutations().collect();
    assert_eq!(first, second);
}

#[test]
fn derived_features_never_become_axes() {
    let ori = FeatureSpec::stepped("orientation", 0.0, PI, PI / 4.0)
        .cyclic(true)
        .resolve()
        .unwrap();
    let dir = Feature::derived("direction", (0.0, 2.0 * PI), true, |vals| {
        vals.get("orientation").unwrap_or(0.0) * 2.0
    });
    let space = FeatureSpace::new(vec![ori, dir]);

    // Only the independent feature is enumerated.
    assert_eq!(space.permutation_count(), 4);

    for perm in space.permutations() {
        assert_eq!(perm.len(), 1);
        let resolved = space.resolve(&perm);
        assert_eq!(resolved.len(), 2);
        let ori_value = resolved.get("orientation").unwrap();
        assert!((resolved.get("direction").unwrap() - ori_value * 2.0).abs() < 1e-12);
    }
}

#[test]
fn generated_values_respect_the_bounds_contract() {
    let lin = FeatureSpec::stepped("size", 0.0, 1.0, 0.25).resolve().unwrap();
    assert_eq!(lin.values().last().copied(), Some(1.0));

    let cyc = FeatureSpec::stepped("phase", 0.0, 2.0 * PI, PI / 2.0)
        .cyclic(true)
        .resolve()
        .unwrap();
    assert_eq!(cyc.values().len(), 4);
    assert!(cyc.values().iter().all(|&v| v < 2.0 * PI));
}
