use crate::{BlurError, ScratchKey, ScratchPool, Size, TextureDesc, TextureFormat};

fn desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc::new(Size::new(width, height), TextureFormat::Rgba8Unorm)
}

#[test]
fn test_pool_reuses_released_memory() {
    let mut pool = ScratchPool::new();
    let mut created = 0u32;
    let a = ScratchKey::named("_A");
    let b = ScratchKey::named("_B");

    let first = *pool
        .acquire(a, desc(64, 64), |_| {
            created += 1;
            Ok(created)
        })
        .unwrap();
    pool.release(a).unwrap();

    let second = *pool
        .acquire(b, desc(64, 64), |_| {
            created += 1;
            Ok(created)
        })
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(pool.allocations(), 1);
    assert_eq!(pool.outstanding(), 1);
}

#[test]
fn test_pool_allocates_for_different_descriptor() {
    let mut pool = ScratchPool::new();
    let a = ScratchKey::named("_A");

    pool.acquire(a, desc(64, 64), |_| Ok(1u32)).unwrap();
    pool.release(a).unwrap();
    let texture = *pool.acquire(a, desc(32, 32), |_| Ok(2u32)).unwrap();

    assert_eq!(texture, 2);
    assert_eq!(pool.allocations(), 2);
    assert_eq!(pool.free_count(), 1);
    assert_eq!(pool.trim(), vec![1]);
    assert_eq!(pool.free_count(), 0);
}

#[test]
fn test_pool_rejects_double_acquire() {
    let mut pool = ScratchPool::new();
    let a = ScratchKey::named("_A");

    pool.acquire(a, desc(8, 8), |_| Ok(())).unwrap();
    let err = pool.acquire(a, desc(8, 8), |_| Ok(())).unwrap_err();
    assert!(matches!(err, BlurError::ScratchInUse(key) if key == a));
}

#[test]
fn test_pool_rejects_unknown_release() {
    let mut pool: ScratchPool<()> = ScratchPool::new();
    let a = ScratchKey::named("_A");

    assert!(matches!(pool.release(a), Err(BlurError::UnknownScratch(_))));

    pool.acquire(a, desc(8, 8), |_| Ok(())).unwrap();
    pool.release(a).unwrap();
    // second release of the same key
    assert!(matches!(pool.release(a), Err(BlurError::UnknownScratch(_))));
}

#[test]
fn test_pool_create_error_propagates() {
    let mut pool: ScratchPool<u32> = ScratchPool::new();
    let a = ScratchKey::named("_A");

    let result = pool.acquire(a, desc(8, 8), |_| Err(BlurError::Gpu("out of memory".to_string())));
    assert!(result.is_err());
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.allocations(), 0);
}

#[test]
fn test_scratch_key_index_matches_name() {
    assert_eq!(ScratchKey::indexed("_Level", 3), ScratchKey::named("_Level3"));
    assert_ne!(ScratchKey::indexed("_Level", 1), ScratchKey::indexed("_Level", 2));
    assert_ne!(ScratchKey::named("_BlurTexture"), ScratchKey::indexed("_Level", 0));
}
