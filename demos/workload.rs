use std::time::Instant;

use clap::Parser;
use clap::ValueEnum;
use crash_hash::ConcurrentTable;
use crash_hash::FixedStr;
use crash_hash::LinearTable;
use crash_hash::LoadFactor;
use crash_hash::QuadraticTable;
use crash_hash::RobinHoodTable;
use crash_hash::Table;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

type Key = FixedStr<32>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Variant {
    Linear,
    Quadratic,
    RobinHood,
    Concurrent,
}

#[derive(Parser, Debug)]
#[command(about = "Runs an 80% get / 15% put / 5% erase workload against one table")]
struct Args {
    #[arg(short = 'v', long, value_enum, default_value_t = Variant::Quadratic)]
    variant: Variant,

    /// Growth threshold in percent (ignored by the linear and concurrent tables).
    #[arg(short = 'l', long, default_value_t = 70, value_parser = clap::value_parser!(u8).range(1..=99))]
    load_factor: u8,

    /// Number of distinct keys drawn by the workload.
    #[arg(short = 'k', long, default_value_t = 1_000_000)]
    keys: usize,

    /// Number of operations to run.
    #[arg(short = 'n', long, default_value_t = 10_000_000)]
    ops: usize,

    #[arg(short = 's', long, default_value_t = 0x5eed)]
    seed: u64,
}

const ALNUM: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn random_key(rng: &mut SmallRng) -> Key {
    let bytes: [u8; 30] = core::array::from_fn(|_| ALNUM[rng.random_range(0..ALNUM.len())]);
    FixedStr::from_bytes(&bytes)
}

/// Runs the mixed workload and returns the elapsed nanoseconds.
fn run<T: Table<Key, u64>>(table: &mut T, keys: &[Key], ops: usize, rng: &mut SmallRng) -> u128 {
    let start = Instant::now();
    for _ in 0..ops {
        let key = &keys[rng.random_range(0..keys.len())];
        match rng.random_range(0..100) {
            0..80 => {
                core::hint::black_box(table.get(key));
            }
            80..95 => {
                if let Err(e) = table.put(*key, 0) {
                    log::error!("put failed: {e}");
                    break;
                }
            }
            _ => {
                table.erase(key);
            }
        }
    }
    start.elapsed().as_nanos()
}

fn report<T: Table<Key, u64>>(table: &T, ops: usize, nanos: u128) {
    println!(
        "{} ops in {:.3}s ({:.1} ns/op)",
        ops,
        nanos as f64 / 1e9,
        nanos as f64 / ops.max(1) as f64
    );
    println!(
        "size {} / capacity {}, {} bytes",
        table.size(),
        table.capacity(),
        table.memory_use()
    );
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let load_factor = match LoadFactor::new(args.load_factor) {
        Ok(lf) => lf,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    println!("Generating {} keys...", args.keys);
    let keys: Vec<Key> = (0..args.keys).map(|_| random_key(&mut rng)).collect();

    println!(
        "Running {} ops against {:?} ({}% load factor)",
        args.ops,
        args.variant,
        load_factor.percent()
    );
    match args.variant {
        Variant::Linear => {
            let mut table: LinearTable<Key, u64> = LinearTable::new();
            let nanos = run(&mut table, &keys, args.ops, &mut rng);
            report(&table, args.ops, nanos);
            #[cfg(all(feature = "stats", feature = "std"))]
            {
                table.probe_histogram().print();
                table.debug_stats().print();
            }
        }
        Variant::Quadratic => {
            let mut table: QuadraticTable<Key, u64> =
                QuadraticTable::with_load_factor(16, load_factor);
            let nanos = run(&mut table, &keys, args.ops, &mut rng);
            report(&table, args.ops, nanos);
            #[cfg(all(feature = "stats", feature = "std"))]
            {
                table.probe_histogram().print();
                table.debug_stats().print();
            }
        }
        Variant::RobinHood => {
            let mut table: RobinHoodTable<Key, u64> =
                RobinHoodTable::with_load_factor(16, load_factor);
            let nanos = run(&mut table, &keys, args.ops, &mut rng);
            report(&table, args.ops, nanos);
            #[cfg(all(feature = "stats", feature = "std"))]
            {
                table.probe_histogram().print();
                table.debug_stats().print();
            }
        }
        Variant::Concurrent => {
            let mut table: ConcurrentTable<Key, u64> =
                ConcurrentTable::with_capacity(args.keys * 2);
            println!(
                "slot cells are {}",
                if ConcurrentTable::<Key, u64>::is_lock_free() {
                    "lock-free"
                } else {
                    "seqlock-guarded"
                }
            );
            let nanos = run(&mut table, &keys, args.ops, &mut rng);
            report(&table, args.ops, nanos);
            println!("tombstones {}", table.tombstones());
        }
    }
}
