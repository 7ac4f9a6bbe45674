//! Small prime helpers for the semiprime domains.

use rand::Rng;

/// Trial-division primality test over `6k ± 1` candidates.
#[must_use]
pub fn is_prime(n: u64) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut k = 5u64;
    while k.saturating_mul(k) <= n {
        if n % k == 0 || n % (k + 2) == 0 {
            return false;
        }
        k += 6;
    }
    true
}

/// Smallest prime strictly greater than `n`.
#[must_use]
pub fn next_prime(n: u64) -> u64 {
    let mut candidate = n + 1;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// `count` increasing primes starting above `10^(digits-1)`.
///
/// With `skip_digits > 0`, every step first jumps ahead by a random amount in
/// `[10^(skip_digits-1), 10^skip_digits]`, so the primes are not consecutive.
pub fn primes_from_digits<R>(count: usize, digits: u32, skip_digits: u32, rng: &mut R) -> Vec<u64>
where
    R: Rng + ?Sized,
{
    let mut prime = 10u64.pow(digits.saturating_sub(1));
    let mut primes = Vec::with_capacity(count);
    for _ in 0..count {
        let skip = if skip_digits > 0 {
            rng.random_range(10u64.pow(skip_digits - 1)..=10u64.pow(skip_digits))
        } else {
            0
        };
        prime = next_prime(prime + skip);
        primes.push(prime);
    }
    primes
}
