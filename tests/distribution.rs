mod common;

use approx::assert_relative_eq;
use dist_matrix::{
    all_reduce_sum, partition_down, verify_lockstep, AnyDistMatrix, AnyScalar, DistError,
    DistMatrix, Distribution, ScalarKind,
};
use num_complex::Complex64;

use common::{init_test_subscriber, on_grid};

fn entry(i: usize, j: usize) -> f64 {
    (i * 100 + j) as f64
}

#[test]
fn test_ten_by_ten_local_shapes() {
    let _guard = init_test_subscriber();
    let out = on_grid(4, |grid| {
        let a = DistMatrix::<f64>::with_size(&grid, Distribution::MC_MR, 10, 10).unwrap();
        let (at, ab) = partition_down(&a, 4).unwrap();
        (
            (grid.row(), grid.col()),
            (a.local_height(), a.local_width()),
            (at.local_height(), ab.local_height()),
        )
    });
    for (coords, local, split) in out {
        assert_eq!(local, (5, 5), "{coords:?}");
        // Rows 0..4 hold two even and two odd rows.
        assert_eq!(split, (2, 3), "{coords:?}");
    }
}

#[test]
fn test_every_distribution_partitions_the_matrix() {
    let _guard = init_test_subscriber();
    for dist in Distribution::ALL {
        let out = on_grid(6, move |grid| {
            let mut a = DistMatrix::<f64>::with_size(&grid, dist, 8, 5).unwrap();
            a.fill(1.0).unwrap();
            let gathered = a.to_global_vec().unwrap();
            // Replicated distributions hold some entries more than once.
            let mut count = [(a.local_height() * a.local_width()) as f64];
            all_reduce_sum(grid.comm(), &mut count).unwrap();
            (gathered, count[0])
        });
        for (gathered, count) in out {
            assert_eq!(gathered, vec![1.0; 40], "{dist}");
            assert!(count >= 40.0, "{dist}");
        }
    }
}

#[test]
fn test_redistribution_round_trip() {
    let _guard = init_test_subscriber();
    let out = on_grid(6, |grid| {
        let mut a = DistMatrix::<f64>::with_alignments(&grid, Distribution::MC_MR, 9, 4, 1, 2)
            .unwrap();
        a.set_from_fn(entry).unwrap();
        let mut path = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
        path.copy_from(&a).unwrap();
        for dist in [
            Distribution::VR_STAR,
            Distribution::STAR_MC,
            Distribution::STAR_MD,
            Distribution::MR_STAR,
        ] {
            let mut next = DistMatrix::<f64>::new(&grid, dist).unwrap();
            next.redistribute_from(&path).unwrap();
            let mut back = DistMatrix::<f64>::new(&grid, Distribution::MC_MR).unwrap();
            back.redistribute_from(&next).unwrap();
            path = back;
        }
        verify_lockstep(grid.comm(), "round trip done").unwrap();
        (path.to_global_vec().unwrap(), a.to_global_vec().unwrap())
    });
    for (result, original) in out {
        assert_eq!(result, original);
    }
}

#[test]
fn test_copy_requires_redistribution_across_alignments() {
    let _guard = init_test_subscriber();
    let out = on_grid(4, |grid| {
        let mut a =
            DistMatrix::<f64>::with_alignments(&grid, Distribution::VC_STAR, 6, 2, 3, 0).unwrap();
        a.set_from_fn(entry).unwrap();
        let mut b =
            DistMatrix::<f64>::with_alignments(&grid, Distribution::VC_STAR, 6, 2, 0, 0).unwrap();
        let refused = matches!(b.copy_from(&a), Err(DistError::AlignmentMismatch { .. }));
        b.redistribute_from(&a).unwrap();
        (refused, b.col_align(), b.get_global(5, 1).unwrap())
    });
    for (refused, align, value) in out {
        assert!(refused);
        assert_eq!(align, 0);
        assert_relative_eq!(value, entry(5, 1));
    }
}

#[test]
fn test_runtime_typed_matrix_on_grid() {
    let _guard = init_test_subscriber();
    let out = on_grid(4, |grid| {
        let mut a = AnyDistMatrix::new(ScalarKind::C64, &grid, Distribution::STAR_VC).unwrap();
        a.resize(2, 8).unwrap();
        let mut owned = 0;
        for j in 0..8 {
            if a.set(1, j, AnyScalar::F32(j as f32)).is_ok() {
                owned += 1;
            }
        }
        (owned, a.get_global(1, 6).unwrap())
    });
    for (owned, value) in out {
        assert_eq!(owned, 2);
        assert_eq!(value, AnyScalar::C64(Complex64::new(6.0, 0.0)));
    }
}
