use crash_hash::ConcurrentTable;
use crash_hash::FixedStr;
use crash_hash::IdentityKey;
use crash_hash::LinearTable;
use crash_hash::LoadFactor;
use crash_hash::MixedKey;
use crash_hash::QuadraticTable;
use crash_hash::RobinHoodTable;
use crash_hash::Table;
use crash_hash::TableError;
use crash_hash::TableKey;
use hashbrown::HashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Debug, Clone, Copy)]
enum Op {
    Get(usize),
    Find(usize),
    Put(usize, u64),
    Erase(usize),
    Clear,
}

/// A seeded op sequence over indices into a key pool. `clear` is rare so the
/// tables spend most of their time populated.
fn ops(seed: u64, pool: usize, len: usize) -> Vec<Op> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let i = rng.random_range(0..pool);
            match rng.random_range(0..1000) {
                0..350 => Op::Get(i),
                350..450 => Op::Find(i),
                450..800 => Op::Put(i, rng.random()),
                800..999 => Op::Erase(i),
                _ => Op::Clear,
            }
        })
        .collect()
}

/// Replays `ops` against `table` and a hashbrown model, checking every
/// observable result and the final contents.
fn check_against_model<K, T>(mut table: T, keys: &[K], ops: &[Op])
where
    K: TableKey + core::hash::Hash + core::fmt::Debug,
    T: Table<K, u64>,
{
    let mut model: HashMap<K, u64> = HashMap::new();
    for (step, op) in ops.iter().copied().enumerate() {
        match op {
            Op::Get(i) => assert_eq!(
                table.get(&keys[i]),
                model.get(&keys[i]).copied(),
                "step {step}: get {:?}",
                keys[i]
            ),
            Op::Find(i) => {
                if let Some(&v) = model.get(&keys[i]) {
                    assert_eq!(table.find(&keys[i]), v, "step {step}: find {:?}", keys[i]);
                } else {
                    // Unspecified for absent keys, but it must not panic.
                    let _ = table.find(&keys[i]);
                }
            }
            Op::Put(i, v) => {
                table.put(keys[i], v).unwrap();
                model.insert(keys[i], v);
            }
            Op::Erase(i) => assert_eq!(
                table.erase(&keys[i]),
                model.remove(&keys[i]).is_some(),
                "step {step}: erase {:?}",
                keys[i]
            ),
            Op::Clear => {
                let capacity = table.capacity();
                table.clear();
                model.clear();
                assert_eq!(table.capacity(), capacity);
            }
        }
        assert_eq!(table.size(), model.len(), "step {step}");
        assert!(table.capacity().is_power_of_two());
        assert!(table.prefetch(&keys[0]) < table.capacity());
    }

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(table.get(key), model.get(key).copied(), "key #{i}");
    }
    assert!(table.memory_use() > 0);
}

fn run_all_variants<K>(keys: &[K], seed: u64)
where
    K: TableKey + core::hash::Hash + core::fmt::Debug,
{
    let script = ops(seed, keys.len(), 30_000);
    check_against_model(LinearTable::<K, u64>::new(), keys, &script);
    for lf in [LoadFactor::FIFTY, LoadFactor::SEVENTY, LoadFactor::NINETY] {
        check_against_model(
            QuadraticTable::<K, u64>::with_load_factor(16, lf),
            keys,
            &script,
        );
        check_against_model(
            RobinHoodTable::<K, u64>::with_load_factor(1, lf),
            keys,
            &script,
        );
    }
    check_against_model(
        ConcurrentTable::<K, u64>::with_capacity(keys.len() * 2),
        keys,
        &script,
    );
}

#[test]
fn mixed_keys_agree_with_model() {
    let keys: Vec<MixedKey> = (0..3_000).map(MixedKey).collect();
    run_all_variants(&keys, 1);
}

#[test]
fn clustered_identity_keys_agree_with_model() {
    // Every key is a multiple of 64, so low bits collide heavily.
    let keys: Vec<IdentityKey> = (0..1_500).map(|k| IdentityKey(k << 6)).collect();
    run_all_variants(&keys, 2);
}

#[test]
fn string_keys_agree_with_model() {
    let keys: Vec<FixedStr<32>> = (0..2_000)
        .map(|i| FixedStr::new(&format!("key_{i:016X}")))
        .collect();
    run_all_variants(&keys, 3);
}

#[cfg(feature = "foldhash")]
#[test]
fn fold_keys_agree_with_model() {
    let keys: Vec<crash_hash::FoldKey> = (0..2_000).map(crash_hash::FoldKey).collect();
    run_all_variants(&keys, 4);
}

#[test]
fn tables_work_through_trait_objects() {
    let mut tables: Vec<Box<dyn Table<MixedKey, u64>>> = vec![
        Box::new(LinearTable::<MixedKey, u64>::new()),
        Box::new(QuadraticTable::<MixedKey, u64>::with_load_factor(
            16,
            LoadFactor::DEFAULT,
        )),
        Box::new(RobinHoodTable::<MixedKey, u64>::new()),
        Box::new(ConcurrentTable::<MixedKey, u64>::with_capacity(256)),
    ];
    for table in &mut tables {
        for k in 0..100 {
            table.put(MixedKey(k), k + 1).unwrap();
        }
        assert_eq!(table.size(), 100);
        assert!(table.erase(&MixedKey(50)));
        assert_eq!(table.get(&MixedKey(50)), None);
        assert_eq!(table.get(&MixedKey(99)), Some(100));
    }
}

#[test]
fn load_factor_is_validated() {
    assert_eq!(LoadFactor::new(0), Err(TableError::InvalidLoadFactor(0)));
    assert_eq!(
        LoadFactor::try_from(100u8).unwrap_err().to_string(),
        "load factor must be within 1..=99 percent, got 100"
    );
}

#[test]
fn capacity_exceeded_is_reported_through_the_trait() {
    let mut table: Box<dyn Table<IdentityKey, u64>> =
        Box::new(ConcurrentTable::<IdentityKey, u64>::with_capacity(2));
    table.put(IdentityKey(0), 0).unwrap();
    table.put(IdentityKey(1), 0).unwrap();
    let err = table.put(IdentityKey(2), 0).unwrap_err();
    assert_eq!(err, TableError::CapacityExceeded { capacity: 2 });
    assert_eq!(
        err.to_string(),
        "table is full: all 2 slots are occupied or tombstoned"
    );
}
