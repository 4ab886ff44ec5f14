//! # Math — Trial-Division Primality and Small-Prime Generation
//!
//! The number-theoretic floor of the crate: an integer square root, trial
//! division over odd divisors, a cache-accelerated variant that walks a
//! precomputed prime list before falling back to odd stepping, and an
//! odd-only packed sieve used to build known-primes cache files.
//!
//! Candidates are plain `u64` values, so everything here is exact — no
//! probabilistic tests, no bignum.

/// Floor of the integer square root.
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    // Float truncation can land one off either way near perfect squares.
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

/// Trial-division primality test over odd divisors.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true; // 2 and 3
    }
    if n % 2 == 0 {
        return false;
    }

    let sqrt = isqrt(n);
    let mut divisor = 3;
    while divisor <= sqrt {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Trial division accelerated by a list of known primes.
///
/// Walks `known` (ascending, starting at 2) while it lasts, then continues
/// stepping over odd divisors from wherever the list ran out. Divisors are
/// tested up to and including the integer square root, so perfect squares of
/// cached primes are correctly rejected.
pub fn is_prime_cached(n: u64, known: &[u64]) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }

    let sqrt = isqrt(n);
    let mut divisor = 0;

    for &p in known {
        divisor = p;
        if divisor > sqrt {
            return true;
        }
        if n % divisor == 0 {
            return false;
        }
    }

    // Ran out of cached primes; resume odd stepping past the last divisor.
    let mut divisor = if divisor < 3 { 3 } else { divisor | 1 };
    while divisor <= sqrt {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Generate all primes up to and including `limit`.
///
/// Odd-only sieve of Eratosthenes, one bit per odd number, so a 10^9 limit
/// costs ~60 MiB instead of ~1 GiB of bools.
pub fn sieve_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }

    let half = ((limit - 1) / 2) as usize; // odd numbers 3, 5, .. <= limit
    let mut composite = vec![0u8; half / 8 + 1];
    let is_set = |bits: &[u8], i: usize| bits[i / 8] & (1 << (i % 8)) != 0;

    let mut primes = vec![2];
    let mut i = 0usize;
    while i < half {
        if !is_set(&composite, i) {
            let p = 2 * (i as u64) + 3;
            primes.push(p);
            // Mark odd multiples from p^2 upward.
            let mut m = p.saturating_mul(p);
            while m <= limit {
                let j = ((m - 3) / 2) as usize;
                composite[j / 8] |= 1 << (j % 8);
                m += 2 * p;
            }
        }
        i += 1;
    }
    primes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_exact_and_floor() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(3), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(24), 4);
        assert_eq!(isqrt(25), 5);
        assert_eq!(isqrt(26), 5);
        assert_eq!(isqrt(u64::MAX), 4_294_967_295);
    }

    #[test]
    fn small_primes_recognized() {
        let primes = [2u64, 3, 5, 7, 11, 13, 101, 1_009, 10_007, 1_000_003];
        for p in primes {
            assert!(is_prime(p), "missed prime {p}");
        }
    }

    #[test]
    fn small_composites_rejected() {
        let composites = [0u64, 1, 4, 9, 15, 21, 25, 49, 100, 1_001, 1_000_001];
        for c in composites {
            assert!(!is_prime(c), "accepted composite {c}");
        }
    }

    #[test]
    fn cached_matches_plain_over_range() {
        let known = sieve_primes(1_000);
        for n in 0..5_000u64 {
            assert_eq!(
                is_prime_cached(n, &known),
                is_prime(n),
                "divergence at {n}"
            );
        }
    }

    #[test]
    fn cached_rejects_squares_of_cached_primes() {
        // The divisor walk must be inclusive of the square root.
        let known = sieve_primes(100);
        for p in [5u64, 7, 11, 13, 97] {
            assert!(!is_prime_cached(p * p, &known), "{} accepted", p * p);
        }
    }

    #[test]
    fn cached_works_past_cache_exhaustion() {
        // Cache covers divisors only up to 10; larger factors come from the
        // odd-stepping fallback.
        let known = sieve_primes(10);
        assert!(!is_prime_cached(13 * 17, &known));
        assert!(is_prime_cached(10_007, &known));
        assert!(!is_prime_cached(10_007 * 10_007, &known));
    }

    #[test]
    fn cached_with_empty_cache() {
        for n in 0..200u64 {
            assert_eq!(is_prime_cached(n, &[]), is_prime(n));
        }
    }

    #[test]
    fn sieve_known_prefix() {
        assert_eq!(sieve_primes(1), Vec::<u64>::new());
        assert_eq!(sieve_primes(2), vec![2]);
        assert_eq!(
            sieve_primes(30),
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]
        );
    }

    #[test]
    fn sieve_count_matches_pi() {
        // pi(10^6) = 78_498
        assert_eq!(sieve_primes(1_000_000).len(), 78_498);
    }

    #[test]
    fn sieve_agrees_with_trial_division() {
        let primes = sieve_primes(2_000);
        for n in 0..=2_000u64 {
            assert_eq!(primes.binary_search(&n).is_ok(), is_prime(n));
        }
    }
}
