//! Integration tests for the buffer pool and B+Tree index.
//!
//! Covers:
//! - Buffer pool eviction order and pin safety under a real disk manager
//! - B+Tree split, merge, redistribution and root collapse scenarios
//! - Randomized insert/remove workloads checked against a model
//! - Persistence of indexes across engine restarts

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

use strata_buffer::{BufferPool, BufferPoolConfig, MemoryBlockStore};
use strata_common::page::PageId;
use strata_common::{StorageConfig, StrataError};
use strata_storage::{
    bootstrap_roots_page, decode_u64_key, u64_key, BPlusTree, BPlusTreeConfig, DiskManager,
    DiskManagerConfig, RowId, StorageEngine,
};

// =============================================================================
// Helpers
// =============================================================================

fn memory_pool(num_frames: usize) -> Arc<BufferPool> {
    let store = Arc::new(MemoryBlockStore::new());
    let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames }, store));
    bootstrap_roots_page(&pool).unwrap();
    pool
}

fn small_config() -> BPlusTreeConfig {
    BPlusTreeConfig::new(8)
        .with_leaf_max_size(4)
        .with_internal_max_size(4)
}

fn row(k: u64) -> RowId {
    RowId::new(PageId::new((k / 100) as u32), (k % 100) as u32)
}

fn scan(tree: &BPlusTree) -> Vec<(u64, RowId)> {
    tree.begin()
        .unwrap()
        .map(|item| {
            let (key, row_id) = item.unwrap();
            (decode_u64_key(&key), row_id)
        })
        .collect()
}

fn engine_config(path: std::path::PathBuf, frames: usize) -> StorageConfig {
    StorageConfig {
        data_file: path,
        buffer_pool_pages: frames,
        fsync_enabled: false,
    }
}

// =============================================================================
// Buffer Pool
// =============================================================================

#[test]
fn test_pool_evicts_least_recently_unpinned() {
    let dir = tempdir().unwrap();
    let disk = Arc::new(
        DiskManager::open(DiskManagerConfig {
            path: dir.path().join("pool.db"),
            fsync_enabled: false,
        })
        .unwrap(),
    );
    let pool = BufferPool::new(BufferPoolConfig { num_frames: 2 }, disk);

    let a = pool.new_page().unwrap().page_id();
    let b = pool.new_page().unwrap().page_id();
    drop(pool.fetch_page(a).unwrap());
    drop(pool.fetch_page(b).unwrap());

    let c = pool.new_page().unwrap();
    assert!(!pool.contains(a));
    assert!(pool.contains(b));
    assert!(pool.contains(c.page_id()));
}

#[test]
fn test_pool_eviction_order_matches_unpin_order() {
    let pool = BufferPool::new(
        BufferPoolConfig { num_frames: 3 },
        Arc::new(MemoryBlockStore::new()),
    );
    let mut guards: Vec<_> = (0..3).map(|_| pool.new_page().unwrap()).collect();
    let ids: Vec<PageId> = guards.iter().map(|g| g.page_id()).collect();

    // Unpin in order A, B, C.
    for guard in guards.drain(..) {
        drop(guard);
    }

    let mut fresh = Vec::new();
    for expected in &ids {
        fresh.push(pool.new_page().unwrap());
        assert!(!pool.contains(*expected));
    }
    assert!(matches!(pool.new_page(), Err(StrataError::BufferPoolFull)));
}

#[test]
fn test_pinned_pages_survive_pressure() {
    let pool = memory_pool(4);
    let mut pinned = pool.new_page().unwrap();
    pinned.data_mut()[100] = 0x5A;
    let pinned_id = pinned.page_id();

    for _ in 0..20 {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[0] = 1;
    }

    assert!(pool.contains(pinned_id));
    assert_eq!(pinned.data()[100], 0x5A);
    assert!(!pool.delete_page(pinned_id).unwrap());
    drop(pinned);
    assert!(pool.delete_page(pinned_id).unwrap());
}

#[test]
fn test_dirty_pages_round_trip_through_disk() {
    let dir = tempdir().unwrap();
    let disk = Arc::new(
        DiskManager::open(DiskManagerConfig {
            path: dir.path().join("rt.db"),
            fsync_enabled: false,
        })
        .unwrap(),
    );
    let pool = BufferPool::new(BufferPoolConfig { num_frames: 3 }, disk);

    let mut ids = Vec::new();
    for i in 0..10u8 {
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[..4].copy_from_slice(&[i, i, i, i]);
        ids.push(guard.page_id());
    }
    for (i, id) in ids.iter().enumerate() {
        let guard = pool.fetch_page(*id).unwrap();
        assert_eq!(&guard.data()[..4], &[i as u8; 4]);
    }
    assert!(pool.check_all_unpinned());
}

// =============================================================================
// B+Tree Scenarios
// =============================================================================

#[test]
fn test_uniqueness() {
    let pool = memory_pool(16);
    let mut tree = BPlusTree::open(1, pool, small_config()).unwrap();

    assert!(tree.insert(&u64_key(5), row(1)).unwrap());
    assert!(!tree.insert(&u64_key(5), row(2)).unwrap());
    assert_eq!(tree.get_value(&u64_key(5)).unwrap(), Some(row(1)));
}

#[test]
fn test_split_then_collapse_then_restart() {
    let pool = memory_pool(16);
    let mut tree = BPlusTree::open(1, Arc::clone(&pool), small_config()).unwrap();

    for k in 1..=5 {
        tree.insert(&u64_key(k), row(k)).unwrap();
    }
    assert_eq!(tree.verify().unwrap().leaf_pages, 2);

    for k in 1..=5 {
        assert!(tree.remove(&u64_key(k)).unwrap());
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), PageId::INVALID);
    for k in 1..=5 {
        assert_eq!(tree.get_value(&u64_key(k)).unwrap(), None);
    }

    assert!(tree.insert(&u64_key(3), row(3)).unwrap());
    assert_eq!(scan(&tree), vec![(3, row(3))]);
    assert!(pool.check_all_unpinned());
}

#[test]
fn test_iteration_matches_point_lookups() {
    let pool = memory_pool(32);
    let mut tree = BPlusTree::open(1, pool, small_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let mut keys: Vec<u64> = (0..300).map(|k| k * 3).collect();
    keys.shuffle(&mut rng);
    for &k in &keys {
        tree.insert(&u64_key(k), row(k)).unwrap();
    }

    let scanned = scan(&tree);
    assert_eq!(scanned.len(), keys.len());
    assert!(scanned.windows(2).all(|w| w[0].0 < w[1].0));
    for (k, row_id) in scanned {
        assert_eq!(tree.get_value(&u64_key(k)).unwrap(), Some(row_id));
    }
}

#[test]
fn test_range_scan_from_key() {
    let pool = memory_pool(32);
    let mut tree = BPlusTree::open(1, pool, small_config()).unwrap();
    for k in (0..100).map(|k| k * 10) {
        tree.insert(&u64_key(k), row(k)).unwrap();
    }

    let range: Vec<u64> = tree
        .begin_at(&u64_key(455))
        .unwrap()
        .map(|item| decode_u64_key(&item.unwrap().0))
        .take_while(|&k| k < 520)
        .collect();
    assert_eq!(range, vec![460, 470, 480, 490, 500, 510]);
}

// =============================================================================
// Randomized Workloads
// =============================================================================

fn run_random_workload(seed: u64, frames: usize, leaf_max: usize, internal_max: usize) {
    let pool = memory_pool(frames);
    let config = BPlusTreeConfig::new(8)
        .with_leaf_max_size(leaf_max)
        .with_internal_max_size(internal_max);
    let mut tree = BPlusTree::open(1, Arc::clone(&pool), config).unwrap();
    let mut model = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(seed);

    for step in 0..3_000 {
        let k = rng.gen_range(0..500u64);
        if rng.gen_bool(0.6) {
            let inserted = tree.insert(&u64_key(k), row(k)).unwrap();
            assert_eq!(inserted, model.insert(k, row(k)).is_none(), "insert {}", k);
        } else {
            let removed = tree.remove(&u64_key(k)).unwrap();
            assert_eq!(removed, model.remove(&k).is_some(), "remove {}", k);
        }
        if step % 250 == 0 {
            tree.verify().unwrap();
        }
    }

    let shape = tree.verify().unwrap();
    assert_eq!(shape.entries, model.len());
    let expected: Vec<(u64, RowId)> = model.into_iter().collect();
    assert_eq!(scan(&tree), expected);
    assert!(pool.check_all_unpinned());
}

#[test]
fn test_random_workload_small_nodes() {
    run_random_workload(1, 64, 4, 4);
}

#[test]
fn test_random_workload_minimum_fanout() {
    run_random_workload(2, 64, 2, 4);
}

#[test]
fn test_random_workload_odd_sizes_tiny_pool() {
    run_random_workload(3, 8, 5, 5);
}

#[test]
fn test_drain_in_random_order() {
    let pool = memory_pool(32);
    let mut tree = BPlusTree::open(1, Arc::clone(&pool), small_config()).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    let mut keys: Vec<u64> = (0..400).collect();
    for &k in &keys {
        tree.insert(&u64_key(k), row(k)).unwrap();
    }
    keys.shuffle(&mut rng);
    for (i, &k) in keys.iter().enumerate() {
        assert!(tree.remove(&u64_key(k)).unwrap());
        if i % 50 == 0 {
            tree.verify().unwrap();
        }
    }
    assert!(tree.is_empty());

    // Every index page went back to the store.
    let stats = pool.stats();
    assert_eq!(stats.pinned_frames, 0);
    for id in 1..200 {
        assert!(pool.is_page_free(PageId::new(id)).unwrap());
    }
}

// =============================================================================
// Failure Handling
// =============================================================================

#[test]
fn test_store_exhaustion_keeps_every_inserted_key() {
    let store = Arc::new(MemoryBlockStore::with_capacity(12));
    let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: 16 }, store.clone()));
    bootstrap_roots_page(&pool).unwrap();
    let mut tree = BPlusTree::open(1, Arc::clone(&pool), small_config()).unwrap();

    let mut inserted = Vec::new();
    let err = loop {
        let k = inserted.len() as u64;
        match tree.insert(&u64_key(k), row(k)) {
            Ok(true) => inserted.push(k),
            Ok(false) => panic!("key {} reported as duplicate", k),
            Err(e) => break e,
        }
    };
    assert!(err.is_exhaustion());

    let expected: Vec<_> = inserted.iter().map(|&k| (k, row(k))).collect();
    assert_eq!(scan(&tree), expected);
    for &k in &inserted {
        assert_eq!(tree.get_value(&u64_key(k)).unwrap(), Some(row(k)));
    }

    // Every allocated page is either the roots directory or part of the tree.
    let shape = tree.verify().unwrap();
    assert_eq!(
        store.allocated_count(),
        1 + shape.leaf_pages + shape.internal_pages
    );
    assert!(pool.check_all_unpinned());
}

#[test]
fn test_two_handles_on_one_index_stay_consistent() {
    let pool = memory_pool(32);
    let mut first = BPlusTree::open(3, Arc::clone(&pool), small_config()).unwrap();
    let mut second = BPlusTree::open(3, Arc::clone(&pool), small_config()).unwrap();
    let mut model = BTreeMap::new();

    let mut rng = StdRng::seed_from_u64(11);
    for step in 0..400 {
        let k = rng.gen_range(0..150u64);
        let tree = if step % 2 == 0 { &mut first } else { &mut second };
        if rng.gen_bool(0.6) {
            let fresh = !model.contains_key(&k);
            assert_eq!(tree.insert(&u64_key(k), row(k)).unwrap(), fresh);
            model.insert(k, row(k));
        } else {
            assert_eq!(tree.remove(&u64_key(k)).unwrap(), model.remove(&k).is_some());
        }
    }

    let expected: Vec<_> = model.into_iter().collect();
    assert_eq!(scan(&first), expected);
    assert_eq!(scan(&second), expected);
    assert_eq!(first.verify().unwrap().entries, expected.len());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_indexes_persist_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("strata.db");

    {
        let engine = StorageEngine::open(engine_config(path.clone(), 8)).unwrap();
        let mut users = engine.open_index(1, small_config()).unwrap();
        let mut orders = engine.open_index(2, BPlusTreeConfig::new(8)).unwrap();
        for k in 0..500u64 {
            users.insert(&u64_key(k), row(k)).unwrap();
            orders.insert(&u64_key(k * 2), row(k * 2)).unwrap();
        }
        for k in (0..500u64).step_by(2) {
            users.remove(&u64_key(k)).unwrap();
        }
        engine.flush().unwrap();
    }

    let engine = StorageEngine::open(engine_config(path, 8)).unwrap();
    let users = engine.open_index(1, small_config()).unwrap();
    let orders = engine.open_index(2, BPlusTreeConfig::new(8)).unwrap();

    assert_eq!(users.verify().unwrap().entries, 250);
    assert_eq!(orders.verify().unwrap().entries, 500);
    assert_eq!(users.get_value(&u64_key(3)).unwrap(), Some(row(3)));
    assert_eq!(users.get_value(&u64_key(4)).unwrap(), None);
    assert_eq!(orders.get_value(&u64_key(998)).unwrap(), Some(row(998)));
    assert!(engine.pool().check_all_unpinned());
}

#[test]
fn test_corrupted_roots_page_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.db");

    {
        let disk = DiskManager::open(DiskManagerConfig {
            path: path.clone(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 2 }, Arc::new(disk));
        let mut guard = pool.new_page().unwrap();
        guard.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    let err = StorageEngine::open(engine_config(path, 4)).err().unwrap();
    assert!(err.is_corruption());
}
