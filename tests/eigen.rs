use coarse_space::*;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Column-major copy of a square matrix.
fn col_major<K: Scalar>(a: &Array2<K>) -> Vec<K> {
    a.t().iter().cloned().collect()
}

macro_rules! generalized_residual {
    ($elem:ty, $rtol:expr) => {
        paste::item! {
            #[test]
            fn [<generalized_residual_ $elem>]() {
                let n = 6;
                let nu = 3;
                let mut rng = StdRng::seed_from_u64(11);
                let a: Array2<$elem> = random_hpd_using(n, &mut rng);
                let b: Array2<$elem> = random_hpd_using(n, &mut rng);

                let mut a_work = col_major(&a);
                let mut b_work = col_major(&b);
                let mut es = Eigensolver::<$elem>::new(n, nu, 1e-12, 0.0);
                let ev = es.solve_generalized(&mut a_work, &mut b_work, None).unwrap();
                assert_eq!(es.nu, nu);
                assert_eq!(ev.dim(), (n, nu));

                for (k, &lambda) in es.eigenvalues.iter().enumerate() {
                    let x = ev.column(k).to_owned();
                    let residual = a.dot(&x) - b.dot(&x).mapv(|v| v * <$elem>::from_real(lambda));
                    assert!(
                        residual.norm_l2() < $rtol * x.norm_l2(),
                        "residual {} too large for eigenvalue {}",
                        residual.norm_l2(),
                        lambda
                    );
                }
                // eigenvalues come out ascending
                assert!(es.eigenvalues.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    };
}

generalized_residual!(f64, 1e-9);
generalized_residual!(f32, 1e-3);

#[test]
fn smallest_eigenpairs_of_a_diagonal_matrix() {
    let n = 4;
    let a = Array2::from_diag(&arr1(&[4.0, 1.0, 3.0, 2.0]));
    let b = Array2::<f64>::eye(n);

    let mut a_work = col_major(&a);
    let mut b_work = col_major(&b);
    let mut es = Eigensolver::<f64>::new(n, 2, 1e-12, 0.0);
    let ev = es.solve_generalized(&mut a_work, &mut b_work, None).unwrap();

    assert_eq!(es.nu, 2);
    assert_aclose!(es.eigenvalues[0], 1.0, 1e-10);
    assert_aclose!(es.eigenvalues[1], 2.0, 1e-10);
    for (k, &lambda) in es.eigenvalues.iter().enumerate() {
        let x = ev.column(k).to_owned();
        assert_close_l2!(&a.dot(&x), &x.mapv(|v| v * lambda), 1e-9);
    }
}

#[test]
fn threshold_selection_keeps_values_below_the_bound() {
    let n = 4;
    let a = Array2::from_diag(&arr1(&[4.0, 1.0, 3.0, 2.0]));
    let b = Array2::<f64>::eye(n);

    let mut a_work = col_major(&a);
    let mut b_work = col_major(&b);
    let mut es = Eigensolver::<f64>::new(n, n, 1e-12, 2.5);
    es.solve_generalized(&mut a_work, &mut b_work, None).unwrap();

    assert_eq!(es.nu, 2);
    assert!(es.eigenvalues.iter().all(|&l| l <= 2.5));
}

#[test]
fn threshold_counts_are_reconciled_across_ranks() {
    let counts = Fabric::run(2, |world| {
        let n = 4;
        let a = Array2::from_diag(&arr1(&[4.0, 1.0, 3.0, 2.0]));
        let b = Array2::<f64>::eye(n);
        // rank 0 would keep two vectors, rank 1 only one
        let threshold = if world.rank() == 0 { 2.5 } else { 1.5 };
        let mut a_work = col_major(&a);
        let mut b_work = col_major(&b);
        let mut es = Eigensolver::<f64>::new(n, n, 1e-12, threshold);
        let ev = es
            .solve_generalized(&mut a_work, &mut b_work, Some(&world))
            .unwrap();
        assert_eq!(ev.ncols(), es.nu);
        es.nu
    });
    assert_eq!(counts, vec![1, 1]);
}

#[test]
fn hermitian_complex_pair() {
    let n = 2;
    let i = c64::new(0.0, 1.0);
    let one = c64::new(1.0, 0.0);
    // eigenvalues 1 and 3
    let a = arr2(&[[2.0 * one, i], [-i, 2.0 * one]]);
    let b = Array2::<c64>::eye(n);

    let mut a_work = col_major(&a);
    let mut b_work = col_major(&b);
    let mut es = Eigensolver::<c64>::new(n, 1, 1e-12, 0.0);
    let ev = es.solve_generalized(&mut a_work, &mut b_work, None).unwrap();

    assert_eq!(es.nu, 1);
    assert_aclose!(es.eigenvalues[0], 1.0, 1e-10);
    let x = ev.column(0).to_owned();
    let lambda = c64::from_real(es.eigenvalues[0]);
    assert_close_l2!(&a.dot(&x), &x.mapv(|v| v * lambda), 1e-9);
}
