use super::*;
use std::sync::Arc;
use std::thread;

fn key(s: &str) -> PositionKey {
    PositionKey::from(s)
}

#[test]
fn test_insert_then_lookup() {
    let cache = EvalCache::unbounded();
    assert_eq!(cache.lookup(&key("a")), None);

    cache.insert(key("a"), 0.25);
    assert_eq!(cache.lookup(&key("a")), Some(0.25));
    assert_eq!(cache.len(), 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_duplicate_insert_newer_value_wins() {
    let cache = EvalCache::unbounded();
    cache.insert(key("a"), 1.0);
    cache.insert(key("a"), 1.0);
    assert_eq!(cache.stats().corruptions, 0);

    cache.insert(key("a"), -3.0);
    assert_eq!(cache.lookup(&key("a")), Some(-3.0));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().corruptions, 1);
}

#[test]
fn test_lru_evicts_least_recently_used() {
    let cache = EvalCache::lru(2);
    cache.insert(key("a"), 1.0);
    cache.insert(key("b"), 2.0);

    // Touch "a" so "b" becomes the oldest
    assert_eq!(cache.lookup(&key("a")), Some(1.0));
    cache.insert(key("c"), 3.0);

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key("a")));
    assert!(!cache.contains(&key("b")));
    assert!(cache.contains(&key("c")));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_lru_overwrite_does_not_evict() {
    let cache = EvalCache::lru(2);
    cache.insert(key("a"), 1.0);
    cache.insert(key("b"), 2.0);
    cache.insert(key("a"), 1.5);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);

    // "b" is now the oldest
    cache.insert(key("c"), 3.0);
    assert!(!cache.contains(&key("b")));
    assert_eq!(cache.lookup(&key("a")), Some(1.5));
}

#[test]
fn test_unbounded_never_evicts() {
    let cache = EvalCache::unbounded();
    for i in 0..1000 {
        cache.insert(PositionKey::new(format!("pos{i}")), i as f32);
    }
    assert_eq!(cache.len(), 1000);
    assert_eq!(cache.stats().evictions, 0);
}

#[test]
fn test_clear() {
    let cache = EvalCache::lru(4);
    cache.insert(key("a"), 1.0);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.lookup(&key("a")), None);
}

#[test]
fn test_concurrent_readers_and_writers() {
    let cache = Arc::new(EvalCache::lru(64));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..500 {
                    let k = PositionKey::new(format!("{}", i % 100));
                    cache.insert(k.clone(), (i % 100) as f32);
                    if let Some(v) = cache.lookup(&k) {
                        assert_eq!(v, (i % 100) as f32, "thread {t}");
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert!(cache.len() <= 64);
    assert_eq!(cache.stats().corruptions, 0);
}
