use coarse_space::*;

fn plan(size: usize, p: usize, mode: TopologyMode, exclusion: Exclusion) -> Vec<Topology> {
    Fabric::run(size, |world| Topology::new(&world, p, mode, exclusion).unwrap())
}

#[test]
fn spread_placement() {
    let tops = plan(8, 2, TopologyMode::Spread, Exclusion::None);
    for t in &tops {
        assert_eq!(t.masters, vec![0, 4]);
    }
    assert_eq!(tops[1].group, vec![0, 1, 2, 3]);
    assert_eq!(tops[6].group, vec![4, 5, 6, 7]);
}

#[test]
fn spread_uneven_last_group() {
    let tops = plan(7, 3, TopologyMode::Spread, Exclusion::None);
    for t in &tops {
        assert_eq!(t.masters, vec![0, 2, 4]);
    }
    // the last master absorbs the remainder
    assert_eq!(tops[6].group, vec![4, 5, 6]);
    assert_eq!(tops[1].group, vec![0, 1]);
}

#[test]
fn masters_first_placement() {
    let tops = plan(8, 2, TopologyMode::MastersFirst, Exclusion::None);
    for t in &tops {
        assert_eq!(t.masters, vec![0, 1]);
    }
    assert_eq!(tops[0].group, vec![0, 2, 3, 4]);
    assert_eq!(tops[1].group, vec![1, 5, 6, 7]);
    assert_eq!(tops[5].group, vec![1, 5, 6, 7]);
}

#[test]
fn triangular_recurrence() {
    // area equalization under a linearly decreasing load: the recurrence
    // d_i = round(P - sqrt(max(P^2 - 2 P d_{i-1} - P^2/p + d_{i-1}^2, 1)))
    // gives boundaries [0, 1, 3] for P = 8, p = 3
    let tops = plan(8, 3, TopologyMode::Triangular, Exclusion::None);
    for t in &tops {
        assert_eq!(t.masters, vec![0, 1, 3]);
    }
    assert_eq!(tops[0].group, vec![0]);
    assert_eq!(tops[2].group, vec![1, 2]);
    assert_eq!(tops[7].group, vec![3, 4, 5, 6, 7]);
    // group sizes grow as the per-rank load shrinks
    let sizes: Vec<usize> = [0, 1, 3].iter().map(|&m| tops[m].group.len()).collect();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn master_count_is_clamped() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let tops = plan(4, 9, TopologyMode::Spread, Exclusion::None);
    for t in &tops {
        assert_eq!(t.p, 2);
        assert_eq!(t.masters.len(), 2);
    }
    let tops = plan(4, 0, TopologyMode::Spread, Exclusion::None);
    for t in &tops {
        assert_eq!(t.p, 1);
    }
}

#[test]
fn degenerate_single_master() {
    let tops = plan(3, 1, TopologyMode::Spread, Exclusion::None);
    for (rank, t) in tops.iter().enumerate() {
        assert_eq!(t.masters, vec![0]);
        assert_eq!(t.group, vec![0, 1, 2]);
        assert_eq!(t.is_master(), rank == 0);
        assert_eq!(t.split_size(), 3);
    }
}

#[test]
fn exactly_p_masters_hold_a_solver_communicator() {
    for &(size, p, mode) in &[
        (8usize, 2usize, TopologyMode::Spread),
        (8, 3, TopologyMode::Triangular),
        (9, 3, TopologyMode::MastersFirst),
        (6, 2, TopologyMode::Spread),
    ] {
        for &exclusion in &[Exclusion::None, Exclusion::SkipGather, Exclusion::Coordinator] {
            let tops = plan(size, p, mode, exclusion);
            let masters = tops.iter().filter(|t| t.is_master()).count();
            assert_eq!(masters, p);
            for t in &tops {
                // every rank sits in exactly one scatter group, whose
                // smallest rank is its master
                assert!(t.split_size() >= 1);
                assert!(t.is_master_rank(t.group[0]));
                assert_eq!(t.split_rank() == 0, t.is_master());
            }
        }
    }
}

#[test]
fn exclusion_drops_masters_from_the_gather_fabric() {
    let tops = plan(6, 2, TopologyMode::Spread, Exclusion::SkipGather);
    // masters are 0 and 3; only the root master stays in the gather comm
    let in_gather: Vec<usize> = tops
        .iter()
        .enumerate()
        .filter_map(|(rank, t)| t.gather_members().map(|_| rank))
        .collect();
    assert_eq!(in_gather, vec![0, 1, 2, 4, 5]);
}
