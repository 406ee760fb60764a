use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LABEL_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";

/// Generates `count` random host/path patterns.
/// Uses a fixed seed for reproducible benchmark results.
pub fn generate_random_patterns(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let host_len = rng.gen_range(3..=20);
            let path_len = rng.gen_range(0..=30);
            let host: String =
                (0..host_len).map(|_| LABEL_CHARS[rng.gen_range(0..LABEL_CHARS.len())] as char).collect();
            let path: String =
                (0..path_len).map(|_| LABEL_CHARS[rng.gen_range(0..LABEL_CHARS.len())] as char).collect();
            format!("{host}.com/{path}")
        })
        .collect()
}
