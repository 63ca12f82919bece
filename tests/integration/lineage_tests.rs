//! Integration tests for lineage bookkeeping
//!
//! These drive the crawl chain, pagination discovery and the progress
//! counter together, the way the coordinator does, without any network.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rceth_harvest::crawler::{build_chain, partition_seeds, seed_alphabet, PaginationState, TaskKind};
use rceth_harvest::ProgressTracker;

#[test]
fn test_discovered_lineage_balances_progress() {
    let token = STANDARD.encode("FOpt.CPage[=]3[;]FOpt.CRec[=]250[;]FProps[0].Name[=]N_LP[;]");
    let state = PaginationState::discover(&token).expect("valid token");

    let mut chain = build_chain(&['a']);
    let search = chain.start().expect("search released");
    assert_eq!(search.kind, TaskKind::Search);

    for page in state.follow_up_pages() {
        chain.enqueue(
            search.lineage,
            TaskKind::Page {
                token: state.token.clone(),
                page,
            },
        );
    }
    assert_eq!(chain.pending_len(), 2);

    let mut progress = ProgressTracker::new();
    progress.expect(state.items_count);
    assert_eq!(progress.outstanding(), 250);

    let mut pages = Vec::new();
    let mut next = chain.enumeration_done(search.id);
    while let Some(task) = next {
        pages.push(task.page());
        next = chain.enumeration_done(task.id);
    }
    assert_eq!(pages, vec![2, 3]);
    assert!(chain.is_drained());

    for _ in 0..250 {
        progress.complete();
    }
    assert_eq!(progress.outstanding(), 0);
    assert!(progress.finish().is_ok());
}

#[test]
fn test_full_alphabet_releases_one_task_at_a_time() {
    let mut rng = StdRng::seed_from_u64(7);
    let seeds = partition_seeds(&mut rng, None);
    assert_eq!(seeds.len(), seed_alphabet().len());

    let mut chain = build_chain(&seeds);
    let mut released = Vec::new();

    let mut next = chain.start();
    while let Some(task) = next {
        // Nothing else may be handed out while a task is active
        assert!(chain.start().is_none());
        released.push(task.lineage);
        next = chain.enumeration_done(task.id);
    }

    assert_eq!(released, seeds);
    assert_eq!(chain.released(), seeds.len() as u64);
    assert!(chain.failures().is_empty());
}

#[test]
fn test_failures_do_not_block_the_chain() {
    let mut chain = build_chain(&['x', 'y', 'z']);

    let first = chain.start().expect("first task");
    let second = chain.fail(first.id, "timeout").expect("second task");
    assert_eq!(second.lineage, 'y');

    // A late report for the failed task changes nothing
    assert!(chain.enumeration_done(first.id).is_none());
    assert_eq!(chain.active().map(|task| task.lineage), Some('y'));

    let third = chain.enumeration_done(second.id).expect("third task");
    assert_eq!(third.lineage, 'z');
    assert!(chain.enumeration_done(third.id).is_none());
    assert!(chain.is_drained());
    assert_eq!(chain.failures().len(), 1);
    assert_eq!(chain.failures()[0].lineage, 'x');
}
