// Multi-threaded use of a shared Engine
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;
use walkv_core::{Engine, EngineConfig, IsolationLevel};

fn thread_count() -> usize {
    std::cmp::min(num_cpus::get() * 2, 16).max(2)
}

#[test]
fn test_concurrent_readers() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_with(EngineConfig::new(temp_dir.path())).unwrap();
    for i in 0..100u32 {
        engine.put(&format!("k:{}", i), &i.to_le_bytes()).unwrap();
    }

    let threads = thread_count();
    let barrier = Barrier::new(threads);
    thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                barrier.wait();
                for round in 0..5_000u32 {
                    let i = round % 100;
                    let value = engine.get(&format!("k:{}", i)).unwrap();
                    assert_eq!(value, i.to_le_bytes());
                }
            });
        }
    });
}

#[test]
fn test_concurrent_writers_and_readers() {
    let temp_dir = TempDir::new().unwrap();
    let config = EngineConfig::new(temp_dir.path());
    let engine = Arc::new(Engine::open_with(config.clone()).unwrap());
    let threads = thread_count();
    let per_thread = 50;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let key = format!("t:{}:{}", t, i);
                    engine.put(&key, key.as_bytes()).unwrap();
                    assert_eq!(engine.get(&key).unwrap(), key.as_bytes());
                    if i % 7 == 0 {
                        engine.delete(&key).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let deleted_per_thread = (0..per_thread).filter(|i| i % 7 == 0).count();
    let expected = threads * (per_thread - deleted_per_thread);
    assert_eq!(engine.stats().unwrap().num_keys, expected);

    // The log reproduces exactly what the threads left behind
    let engine = Arc::try_unwrap(engine).ok().unwrap();
    std::mem::forget(engine);
    let reopened = Engine::open_with(config).unwrap();
    assert_eq!(reopened.stats().unwrap().num_keys, expected);
}

#[test]
fn test_transaction_ids_unique_across_threads() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_with(EngineConfig::new(temp_dir.path())).unwrap();
    let threads = thread_count();
    let per_thread = 100;

    let ids: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    (0..per_thread)
                        .map(|_| {
                            engine
                                .begin_transaction(IsolationLevel::default())
                                .unwrap()
                                .id()
                                .as_u64()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), threads * per_thread);
    assert_eq!(*unique.iter().max().unwrap(), (threads * per_thread) as u64);
    assert_eq!(
        engine.stats().unwrap().num_transactions,
        (threads * per_thread) as u64
    );
}

#[test]
fn test_concurrent_transaction_commits() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_with(EngineConfig::new(temp_dir.path())).unwrap();
    let threads = thread_count();

    thread::scope(|s| {
        for t in 0..threads {
            let engine = &engine;
            s.spawn(move || {
                let mut txn = engine.begin_transaction(IsolationLevel::default()).unwrap();
                for i in 0..20 {
                    txn.put(&format!("t{}:{}", t, i), b"v").unwrap();
                }
                txn.put("contended", format!("{}", t).as_bytes()).unwrap();
                txn.commit().unwrap();
            });
        }
    });

    let stats = engine.stats().unwrap();
    assert_eq!(stats.num_keys, threads * 20 + 1);
    let winner = String::from_utf8(engine.get("contended").unwrap()).unwrap();
    assert!(winner.parse::<usize>().unwrap() < threads);
}
