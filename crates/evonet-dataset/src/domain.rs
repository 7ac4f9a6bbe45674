//! Problem domains and their dataset generators.
//!
//! Each [`ProblemDomain`] maps to one [`DatasetGenerator`]. A generator makes
//! the raw problems (`a`, `b`, `answer`) and knows how to pack their operands
//! into the integer that becomes the network input bits.
//!
//! | domain | row | input | output |
//! |---|---|---|---|
//! | add | `(a, b, a + b)` | `a` and `b` side by side | `a + b` |
//! | multiply | `(a, b, a * b)` | `a` and `b` side by side | `a * b` |
//! | mod | `(s, s mod r, r)` with `s = p * q` | `s` and `s mod r` side by side | `r` |
//! | factor | `(s, 0, p)` with `s = p * q` | `s` | `p` |

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{DatasetError, Encoding, primes};

/// Start of the first operand sequence of the arithmetic domains.
const FIRST_OPERAND_START: u64 = 10;
/// Upper bound of the random gap between consecutive operands.
const OPERAND_SKIP: f64 = 10.0;
/// Number of prime digits for the semiprime domains.
const PRIME_DIGITS: u32 = 3;
/// Rows generated per semiprime in the mod domain.
const ROWS_PER_SEMIPRIME: usize = 10;

/// One generated problem.
///
/// The meaning of `a` and `b` depends on the domain; `answer` is always what
/// the network learns to output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub a: u64,
    pub b: u64,
    pub answer: u64,
}

impl Problem {
    #[must_use]
    pub const fn new(a: u64, b: u64, answer: u64) -> Self {
        Self { a, b, answer }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(rename_all = "lowercase")]
pub enum ProblemDomain {
    #[display("add")]
    Add,
    #[display("mod")]
    Mod,
    #[display("multiply")]
    Multiply,
    #[display("factor")]
    Factor,
}

impl ProblemDomain {
    pub const ALL: [Self; 4] = [Self::Add, Self::Mod, Self::Multiply, Self::Factor];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mod => "mod",
            Self::Multiply => "multiply",
            Self::Factor => "factor",
        }
    }

    /// The generator for this domain.
    #[must_use]
    pub fn generator(self) -> &'static dyn DatasetGenerator {
        match self {
            Self::Add => &Addition,
            Self::Mod => &Modulo,
            Self::Multiply => &Multiplication,
            Self::Factor => &Factorization,
        }
    }
}

/// Produces problems for one domain and packs them into bit patterns.
pub trait DatasetGenerator: Send + Sync {
    fn domain(&self) -> ProblemDomain;

    /// Generates about `quantity` problems (unshuffled).
    fn generate(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Problem>;

    /// Bit widths needed to hold every problem in `problems`.
    fn encoding(&self, problems: &[Problem], input_factor: usize) -> Encoding;

    /// The integer whose low `encoding.input_bits` bits form the input.
    fn pack_input(&self, problem: &Problem, encoding: &Encoding) -> u128;

    /// Inverse of [`Self::pack_input`]: recovers `(a, b)`.
    fn unpack_input(&self, packed: u128, encoding: &Encoding) -> (u64, u64);

    /// Builds a question (answer unknown) from user-supplied operands.
    fn query(&self, operands: &[u64]) -> Result<Problem, DatasetError>;

    /// Whether `problem.answer` is a correct answer for its operands.
    fn is_correct(&self, problem: &Problem) -> bool;
}

/// Number of binary digits needed for `value` (at least 1).
#[must_use]
pub fn bit_len(value: u64) -> usize {
    usize::try_from(u64::BITS - value.leading_zeros())
        .unwrap_or(64)
        .max(1)
}

/// Increasing sequence starting at `start`; each step adds `1 + floor(skip * u)`.
fn operand_sequence(start: u64, count: usize, skip: f64, rng: &mut dyn RngCore) -> Vec<u64> {
    let mut value = start;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        if i > 0 {
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let step = 1 + (skip * rng.random::<f64>()) as u64;
            value += step;
        }
        values.push(value);
    }
    values
}

fn side_by_side_encoding(problems: &[Problem], input_factor: usize) -> Encoding {
    let max_operand = problems.iter().map(|p| p.a.max(p.b)).max().unwrap_or(0);
    let max_answer = problems.iter().map(|p| p.answer).max().unwrap_or(0);
    Encoding {
        input_bits: 2 * bit_len(max_operand),
        output_bits: bit_len(max_answer),
        input_factor,
    }
}

fn pack_side_by_side(problem: &Problem, encoding: &Encoding) -> u128 {
    let half = encoding.input_bits / 2;
    (u128::from(problem.a) << half) | u128::from(problem.b)
}

fn unpack_side_by_side(packed: u128, encoding: &Encoding) -> (u64, u64) {
    let half = encoding.input_bits / 2;
    let mask = (1u128 << half) - 1;
    let a = u64::try_from(packed >> half).unwrap_or(u64::MAX);
    let b = u64::try_from(packed & mask).unwrap_or(u64::MAX);
    (a, b)
}

fn two_operands(operands: &[u64]) -> Result<(u64, u64), DatasetError> {
    match operands {
        [a, b] => Ok((*a, *b)),
        _ => Err(DatasetError::OperandCount {
            expected: 2,
            actual: operands.len(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Addition;

impl DatasetGenerator for Addition {
    fn domain(&self) -> ProblemDomain {
        ProblemDomain::Add
    }

    fn generate(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Problem> {
        let first = operand_sequence(FIRST_OPERAND_START, quantity, OPERAND_SKIP, rng);
        let second = operand_sequence(FIRST_OPERAND_START + 5, quantity, OPERAND_SKIP, rng);
        first
            .into_iter()
            .zip(second)
            .map(|(a, b)| Problem::new(a, b, a + b))
            .collect()
    }

    fn encoding(&self, problems: &[Problem], input_factor: usize) -> Encoding {
        side_by_side_encoding(problems, input_factor)
    }

    fn pack_input(&self, problem: &Problem, encoding: &Encoding) -> u128 {
        pack_side_by_side(problem, encoding)
    }

    fn unpack_input(&self, packed: u128, encoding: &Encoding) -> (u64, u64) {
        unpack_side_by_side(packed, encoding)
    }

    fn query(&self, operands: &[u64]) -> Result<Problem, DatasetError> {
        let (a, b) = two_operands(operands)?;
        Ok(Problem::new(a, b, 0))
    }

    fn is_correct(&self, problem: &Problem) -> bool {
        problem.a.checked_add(problem.b) == Some(problem.answer)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Multiplication;

impl DatasetGenerator for Multiplication {
    fn domain(&self) -> ProblemDomain {
        ProblemDomain::Multiply
    }

    fn generate(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Problem> {
        let first = operand_sequence(FIRST_OPERAND_START, quantity, OPERAND_SKIP, rng);
        let second = operand_sequence(FIRST_OPERAND_START, quantity, OPERAND_SKIP, rng);
        first
            .into_iter()
            .zip(second)
            .map(|(a, b)| Problem::new(a, b, a.saturating_mul(b)))
            .collect()
    }

    fn encoding(&self, problems: &[Problem], input_factor: usize) -> Encoding {
        side_by_side_encoding(problems, input_factor)
    }

    fn pack_input(&self, problem: &Problem, encoding: &Encoding) -> u128 {
        pack_side_by_side(problem, encoding)
    }

    fn unpack_input(&self, packed: u128, encoding: &Encoding) -> (u64, u64) {
        unpack_side_by_side(packed, encoding)
    }

    fn query(&self, operands: &[u64]) -> Result<Problem, DatasetError> {
        let (a, b) = two_operands(operands)?;
        Ok(Problem::new(a, b, 0))
    }

    fn is_correct(&self, problem: &Problem) -> bool {
        problem.a.checked_mul(problem.b) == Some(problem.answer)
    }
}

/// Semiprime remainders: given `s` and `s mod r`, find the divisor `r`.
#[derive(Debug, Clone, Copy)]
pub struct Modulo;

impl DatasetGenerator for Modulo {
    fn domain(&self) -> ProblemDomain {
        ProblemDomain::Mod
    }

    fn generate(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Problem> {
        let count = quantity / ROWS_PER_SEMIPRIME;
        let p_primes = primes::primes_from_digits(count, PRIME_DIGITS, 2, rng);
        let q_primes = primes::primes_from_digits(count, PRIME_DIGITS, 2, rng);
        let mut problems = Vec::with_capacity(count * ROWS_PER_SEMIPRIME);
        for (p, q) in p_primes.into_iter().zip(q_primes) {
            let semiprime = p * q;
            #[expect(clippy::cast_precision_loss)]
            let root = (semiprime as f64).sqrt();
            for _ in 1..ROWS_PER_SEMIPRIME {
                #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let divisor = (root * rng.random::<f64>() + 2.0) as u64;
                problems.push(Problem::new(semiprime, semiprime % divisor, divisor));
            }
            problems.push(Problem::new(semiprime, 0, p));
        }
        problems
    }

    fn encoding(&self, problems: &[Problem], input_factor: usize) -> Encoding {
        side_by_side_encoding(problems, input_factor)
    }

    fn pack_input(&self, problem: &Problem, encoding: &Encoding) -> u128 {
        pack_side_by_side(problem, encoding)
    }

    fn unpack_input(&self, packed: u128, encoding: &Encoding) -> (u64, u64) {
        unpack_side_by_side(packed, encoding)
    }

    fn query(&self, operands: &[u64]) -> Result<Problem, DatasetError> {
        let (a, b) = two_operands(operands)?;
        Ok(Problem::new(a, b, 0))
    }

    fn is_correct(&self, problem: &Problem) -> bool {
        problem.answer != 0 && problem.a % problem.answer == problem.b
    }
}

/// Semiprime factorization: given `s = p * q`, find `p`.
#[derive(Debug, Clone, Copy)]
pub struct Factorization;

impl DatasetGenerator for Factorization {
    fn domain(&self) -> ProblemDomain {
        ProblemDomain::Factor
    }

    fn generate(&self, quantity: usize, rng: &mut dyn RngCore) -> Vec<Problem> {
        let p_primes = primes::primes_from_digits(quantity, PRIME_DIGITS, 1, rng);
        let q_primes = primes::primes_from_digits(quantity, PRIME_DIGITS, 1, rng);
        p_primes
            .into_iter()
            .zip(q_primes)
            .map(|(p, q)| Problem::new(p * q, 0, p))
            .collect()
    }

    fn encoding(&self, problems: &[Problem], input_factor: usize) -> Encoding {
        let max_semiprime = problems.iter().map(|p| p.a).max().unwrap_or(0);
        let max_prime = problems.iter().map(|p| p.answer).max().unwrap_or(0);
        #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let root = (max_semiprime as f64).sqrt() as u64;
        Encoding {
            input_bits: bit_len(max_semiprime),
            output_bits: bit_len(root.max(max_prime)),
            input_factor,
        }
    }

    fn pack_input(&self, problem: &Problem, _encoding: &Encoding) -> u128 {
        u128::from(problem.a)
    }

    fn unpack_input(&self, packed: u128, _encoding: &Encoding) -> (u64, u64) {
        (u64::try_from(packed).unwrap_or(u64::MAX), 0)
    }

    fn query(&self, operands: &[u64]) -> Result<Problem, DatasetError> {
        match operands {
            [s] => Ok(Problem::new(*s, 0, 0)),
            _ => Err(DatasetError::OperandCount {
                expected: 1,
                actual: operands.len(),
            }),
        }
    }

    fn is_correct(&self, problem: &Problem) -> bool {
        problem.answer > 1 && problem.answer < problem.a && problem.a % problem.answer == 0
    }
}
