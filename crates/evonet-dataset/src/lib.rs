//! Binary-encoded arithmetic datasets for the evolutionary trainer.
//!
//! A [`Dataset`] is a shuffled list of [`Problem`]s of one [`ProblemDomain`]
//! plus its bit encoding: one input row and one target row per problem, every
//! value `0.0` or `1.0`. The last `validation_percent` of the rows form the
//! validation split.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, s};
use rand::{SeedableRng as _, seq::SliceRandom as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

pub use self::domain::{
    Addition, DatasetGenerator, Factorization, Modulo, Multiplication, Problem, ProblemDomain,
    bit_len,
};

pub mod binary;
mod domain;
pub mod primes;

/// Widest supported input, in bits.
pub const MAX_INPUT_BITS: usize = 128;
/// Widest supported output, in bits.
pub const MAX_OUTPUT_BITS: usize = 64;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DatasetError {
    #[display("expected {expected} operands, got {actual}")]
    OperandCount { expected: usize, actual: usize },
    #[display("operands do not fit into {bits} input bits")]
    OperandTooWide { bits: usize },
    #[display("problem {index} does not fit the dataset encoding")]
    ProblemOutOfRange { index: usize },
    #[display("unsupported encoding: {input_bits} input bits, {output_bits} output bits")]
    UnsupportedEncoding {
        input_bits: usize,
        output_bits: usize,
    },
    #[display("validation percentage {percent} is out of range")]
    ValidationPercent { percent: u32 },
    #[display("expected {expected} columns, got {actual}")]
    ColumnCount { expected: usize, actual: usize },
}

/// Bit widths of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Width of one copy of the packed operands.
    pub input_bits: usize,
    pub output_bits: usize,
    /// How many times the input bits are repeated side by side.
    pub input_factor: usize,
}

impl Encoding {
    /// Number of input columns (`input_bits * input_factor`).
    #[must_use]
    pub const fn input_width(&self) -> usize {
        self.input_bits * self.input_factor
    }

    fn is_supported(&self) -> bool {
        (1..=MAX_INPUT_BITS).contains(&self.input_bits)
            && (1..=MAX_OUTPUT_BITS).contains(&self.output_bits)
            && self.input_factor >= 1
    }
}

/// A problem decoded from network outputs, with its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub problem: Problem,
    pub correct: bool,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    domain: ProblemDomain,
    encoding: Encoding,
    validation_percent: u32,
    problems: Vec<Problem>,
    inputs: Array2<f64>,
    targets: Array2<f64>,
}

impl Dataset {
    /// Generates and shuffles about `quantity` problems, then encodes them.
    pub fn generate(
        domain: ProblemDomain,
        quantity: usize,
        input_factor: usize,
        validation_percent: u32,
        seed: u64,
    ) -> Result<Self, DatasetError> {
        let generator = domain.generator();
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut problems = generator.generate(quantity, &mut rng);
        problems.shuffle(&mut rng);
        let encoding = generator.encoding(&problems, input_factor);
        Self::from_problems(domain, encoding, validation_percent, problems)
    }

    /// Rebuilds a dataset from stored problems and their encoding.
    pub fn from_problems(
        domain: ProblemDomain,
        encoding: Encoding,
        validation_percent: u32,
        problems: Vec<Problem>,
    ) -> Result<Self, DatasetError> {
        if !encoding.is_supported() {
            return Err(DatasetError::UnsupportedEncoding {
                input_bits: encoding.input_bits,
                output_bits: encoding.output_bits,
            });
        }
        if validation_percent > 100 {
            return Err(DatasetError::ValidationPercent {
                percent: validation_percent,
            });
        }
        let generator = domain.generator();
        let mut inputs = Array2::zeros((problems.len(), encoding.input_width()));
        let mut targets = Array2::zeros((problems.len(), encoding.output_bits));
        for (index, problem) in problems.iter().enumerate() {
            let packed = pack_checked(generator, problem, &encoding);
            let Some(packed) = packed.filter(|_| fits(problem.answer.into(), encoding.output_bits))
            else {
                return Err(DatasetError::ProblemOutOfRange { index });
            };
            write_input(inputs.row_mut(index), packed, &encoding);
            for (cell, bit) in targets
                .row_mut(index)
                .iter_mut()
                .zip(binary::to_bits(problem.answer.into(), encoding.output_bits))
            {
                *cell = bit;
            }
        }
        Ok(Self {
            domain,
            encoding,
            validation_percent,
            problems,
            inputs,
            targets,
        })
    }

    #[must_use]
    pub fn domain(&self) -> ProblemDomain {
        self.domain
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn validation_percent(&self) -> u32 {
        self.validation_percent
    }

    #[must_use]
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of rows in the validation split.
    #[must_use]
    pub fn validation_len(&self) -> usize {
        self.len() * self.validation_percent as usize / 100
    }

    /// `(inputs, targets)` of the training split.
    #[must_use]
    pub fn train(&self) -> (ArrayView2<'_, f64>, ArrayView2<'_, f64>) {
        let end = self.len() - self.validation_len();
        (
            self.inputs.slice(s![..end, ..]),
            self.targets.slice(s![..end, ..]),
        )
    }

    /// `(inputs, targets)` of the validation split (the last rows).
    #[must_use]
    pub fn validation(&self) -> (ArrayView2<'_, f64>, ArrayView2<'_, f64>) {
        let start = self.len() - self.validation_len();
        (
            self.inputs.slice(s![start.., ..]),
            self.targets.slice(s![start.., ..]),
        )
    }

    /// Encodes user operands as a single input row.
    pub fn encode_query(&self, operands: &[u64]) -> Result<Array2<f64>, DatasetError> {
        let generator = self.domain.generator();
        let problem = generator.query(operands)?;
        let packed = pack_checked(generator, &problem, &self.encoding).ok_or(
            DatasetError::OperandTooWide {
                bits: self.encoding.input_bits,
            },
        )?;
        let mut input = Array2::zeros((1, self.encoding.input_width()));
        write_input(input.row_mut(0), packed, &self.encoding);
        Ok(input)
    }

    /// Turns input rows and network outputs back into checked answers.
    ///
    /// Operands are read from the first copy of the input bits; every output
    /// is rounded at `0.5`.
    pub fn decode(
        &self,
        inputs: ArrayView2<'_, f64>,
        predictions: ArrayView2<'_, f64>,
    ) -> Result<Vec<Answer>, DatasetError> {
        check_columns(self.encoding.input_width(), inputs.ncols())?;
        check_columns(self.encoding.output_bits, predictions.ncols())?;
        let answers = inputs
            .rows()
            .into_iter()
            .zip(predictions.rows())
            .map(|(input, prediction)| self.decode_row(input, prediction))
            .collect();
        Ok(answers)
    }

    /// Decodes a single input row and its network output.
    #[must_use]
    pub fn decode_row(&self, input: ArrayView1<'_, f64>, prediction: ArrayView1<'_, f64>) -> Answer {
        let generator = self.domain.generator();
        let packed = binary::from_bits(input.iter().take(self.encoding.input_bits).copied());
        let (a, b) = generator.unpack_input(packed, &self.encoding);
        let answer = u64::try_from(binary::from_bits(prediction.iter().copied())).unwrap_or(u64::MAX);
        let problem = Problem::new(a, b, answer);
        Answer {
            problem,
            correct: generator.is_correct(&problem),
        }
    }
}

/// Packs the operands, or `None` if any of them does not fit its bit field.
fn pack_checked(
    generator: &dyn DatasetGenerator,
    problem: &Problem,
    encoding: &Encoding,
) -> Option<u128> {
    let packed = generator.pack_input(problem, encoding);
    let round_trips = generator.unpack_input(packed, encoding) == (problem.a, problem.b);
    (round_trips && fits(packed, encoding.input_bits)).then_some(packed)
}

fn fits(value: u128, bits: usize) -> bool {
    u32::try_from(bits)
        .ok()
        .and_then(|bits| value.checked_shr(bits))
        .is_none_or(|rest| rest == 0)
}

fn check_columns(expected: usize, actual: usize) -> Result<(), DatasetError> {
    if expected == actual {
        Ok(())
    } else {
        Err(DatasetError::ColumnCount { expected, actual })
    }
}

fn write_input(mut row: ArrayViewMut1<'_, f64>, packed: u128, encoding: &Encoding) {
    let bits = binary::to_bits(packed, encoding.input_bits).collect::<Vec<_>>();
    for (cell, bit) in row.iter_mut().zip(bits.iter().cycle()) {
        *cell = *bit;
    }
}
