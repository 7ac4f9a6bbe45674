use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{
    ResourceError,
    allele::{AlleleBounds, AlleleCoverageError, AlleleTable},
};

/// Keeps [`squash`] strictly inside `(0, 1)` where `tanh` rounds to `±1`.
const SQUASH_MARGIN: f64 = 1e-15;

/// Error magnitude above which a prediction counts as saturated on the wrong side.
const SATURATION_THRESHOLD: f64 = 0.999;

/// Numerically stable logistic sigmoid, `0.5 * (1 + tanh(0.5 x))`.
///
/// The result is clamped into the open interval `(0, 1)`.
#[must_use]
pub fn squash(x: f64) -> f64 {
    (0.5 * (1.0 + (0.5 * x).tanh())).clamp(SQUASH_MARGIN, 1.0 - SQUASH_MARGIN)
}

/// Slope of [`squash`] expressed through its output `a`.
#[must_use]
pub fn squash_gradient(a: f64) -> f64 {
    a * (1.0 - a)
}

/// Widths of the input, hidden and output layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSizes {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
}

impl LayerSizes {
    #[must_use]
    pub const fn new(input: usize, hidden: usize, output: usize) -> Self {
        Self {
            input,
            hidden,
            output,
        }
    }

    /// `(rows, cols)` of the three weight matrices.
    #[must_use]
    pub const fn shapes(&self) -> [(usize, usize); 3] {
        [
            (self.input, self.hidden),
            (self.hidden, self.hidden),
            (self.hidden, self.output),
        ]
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum NetworkError {
    #[display("weight matrix {layer} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        layer: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[display("weight matrix {layer} has {actual} values, expected {expected}")]
    ValueCount {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    #[display("allele table of weight matrix {layer} is invalid: {source}")]
    Alleles {
        layer: usize,
        source: AlleleCoverageError,
    },
}

/// One weight matrix and the allele table that partitions it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightLayer {
    weights: Array2<f64>,
    alleles: AlleleTable,
}

impl WeightLayer {
    /// Rebuilds a layer from a row-major value list and persisted alleles.
    pub fn from_parts(
        layer: usize,
        shape: (usize, usize),
        values: Vec<f64>,
        alleles: Vec<Vec<usize>>,
    ) -> Result<Self, NetworkError> {
        let expected = shape.0 * shape.1;
        if values.len() != expected {
            return Err(NetworkError::ValueCount {
                layer,
                expected,
                actual: values.len(),
            });
        }
        let weights = Array2::from_shape_vec(shape, values).map_err(|_| {
            NetworkError::ValueCount {
                layer,
                expected,
                actual: expected,
            }
        })?;
        let alleles = AlleleTable::from_alleles(alleles, expected)
            .map_err(|source| NetworkError::Alleles { layer, source })?;
        Ok(Self { weights, alleles })
    }

    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    #[must_use]
    pub fn alleles(&self) -> &AlleleTable {
        &self.alleles
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    /// Number of weights (length of the flattened matrix).
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weights in row-major (flattened) order.
    pub fn flat_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights.iter().copied()
    }

    /// Weight at a row-major flat index.
    #[must_use]
    pub fn get_flat(&self, index: usize) -> Option<f64> {
        let cols = self.weights.ncols();
        if cols == 0 {
            return None;
        }
        self.weights.get((index / cols, index % cols)).copied()
    }

    pub(crate) fn set_flat(&mut self, index: usize, value: f64) {
        let cols = self.weights.ncols();
        if cols == 0 {
            return;
        }
        if let Some(w) = self.weights.get_mut((index / cols, index % cols)) {
            *w = value;
        }
    }
}

/// Activations of one forward pass, before any dropout was applied.
#[derive(Debug, Clone)]
pub struct Activations {
    pub hidden1: Array2<f64>,
    pub hidden2: Array2<f64>,
    pub output: Array2<f64>,
}

/// Hyperparameters of one [`Network::train`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    pub iterations: usize,
    pub dropout_percent: u32,
    pub learn_rate: f64,
    /// The learn rate is divided by this after every iteration; `1.0` disables decay.
    pub learn_decay: f64,
}

/// Mean absolute error plus the two saturated-wrong counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub mean_abs_error: f64,
    /// Predictions whose error (target - prediction) is below `-0.999`.
    pub low_saturated: usize,
    /// Predictions whose error is above `0.999`.
    pub high_saturated: usize,
}

/// Result of a deterministic, dropout-free pass over labelled data.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub predictions: Array2<f64>,
    /// Elementwise `target - prediction`.
    pub errors: Array2<f64>,
    pub summary: ErrorSummary,
}

/// A three-matrix feed-forward network (the genome).
///
/// ```text
/// input --W1--> hidden1 --W2--> hidden2 --W3--> output
/// ```
///
/// Every activation is [`squash`]ed. Each weight matrix carries an immutable
/// [`AlleleTable`] used by [`crossover`](crate::crossover) and
/// [`mutate`](crate::mutate).
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: [WeightLayer; 3],
}

impl Network {
    /// Creates a network with uniform random weights in `[-1, 1]` and the
    /// default allele bounds.
    ///
    /// Identical `sizes` and `seed` always produce identical weights and
    /// allele tables.
    pub fn new(sizes: LayerSizes, seed: u64) -> Result<Self, ResourceError> {
        Self::with_allele_bounds(sizes, AlleleBounds::default(), seed)
    }

    /// Like [`Self::new`], but with explicit allele length bounds.
    pub fn with_allele_bounds(
        sizes: LayerSizes,
        bounds: AlleleBounds,
        seed: u64,
    ) -> Result<Self, ResourceError> {
        let mut rng = Pcg32::seed_from_u64(seed);
        let [s1, s2, s3] = sizes.shapes();
        let w1 = random_matrix(s1, sizes, &mut rng)?;
        let w2 = random_matrix(s2, sizes, &mut rng)?;
        let w3 = random_matrix(s3, sizes, &mut rng)?;
        let layers = [w1, w2, w3].map(|weights| {
            let alleles = AlleleTable::partition(weights.len(), bounds, &mut rng);
            WeightLayer { weights, alleles }
        });
        Ok(Self { layers })
    }

    /// Reassembles a network from its three layers, checking that the matrix
    /// shapes chain together.
    pub fn from_layers(layers: [WeightLayer; 3]) -> Result<Self, NetworkError> {
        let (input, hidden) = layers[0].shape();
        let output = layers[2].shape().1;
        let expected = LayerSizes::new(input, hidden, output).shapes();
        for (layer, (weights, expected)) in layers.iter().zip(expected).enumerate() {
            let actual = weights.shape();
            if actual != expected {
                return Err(NetworkError::ShapeMismatch {
                    layer,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self { layers })
    }

    #[must_use]
    pub fn sizes(&self) -> LayerSizes {
        let (input, hidden) = self.layers[0].shape();
        LayerSizes::new(input, hidden, self.layers[2].shape().1)
    }

    #[must_use]
    pub fn layers(&self) -> &[WeightLayer; 3] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [WeightLayer; 3] {
        &mut self.layers
    }

    /// Runs one forward pass.
    ///
    /// With `dropout_percent > 0` the activation feeding the next matrix is
    /// zeroed per element with probability `dropout_percent / 100`. The
    /// returned activations are the undropped ones; the output is never
    /// dropped.
    ///
    /// # Panics
    ///
    /// Panics if `input` does not have `sizes().input` columns.
    pub fn forward<R>(
        &self,
        input: ArrayView2<'_, f64>,
        dropout_percent: u32,
        rng: &mut R,
    ) -> Activations
    where
        R: Rng + ?Sized,
    {
        let [w1, w2, w3] = &self.layers;
        let hidden1 = input.dot(&w1.weights).mapv_into(squash);
        let hidden2 = drop_out(&hidden1, dropout_percent, rng)
            .dot(&w2.weights)
            .mapv_into(squash);
        let output = drop_out(&hidden2, dropout_percent, rng)
            .dot(&w3.weights)
            .mapv_into(squash);
        Activations {
            hidden1,
            hidden2,
            output,
        }
    }

    /// Deterministic forward pass without dropout.
    #[must_use]
    pub fn predict(&self, input: ArrayView2<'_, f64>) -> Array2<f64> {
        let [w1, w2, w3] = &self.layers;
        let hidden1 = input.dot(&w1.weights).mapv_into(squash);
        let hidden2 = hidden1.dot(&w2.weights).mapv_into(squash);
        hidden2.dot(&w3.weights).mapv_into(squash)
    }

    /// Trains on one batch with back-propagation for `params.iterations`
    /// steps and returns the mean absolute output error over all iterations.
    ///
    /// # Panics
    ///
    /// Panics if the batch shapes do not match the network sizes.
    pub fn train<R>(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView2<'_, f64>,
        params: &TrainParams,
        rng: &mut R,
    ) -> f64
    where
        R: Rng + ?Sized,
    {
        self.train_interruptible(inputs, targets, params, rng, || false)
            .unwrap_or(f64::NAN)
    }

    /// Like [`Self::train`], but polls `is_cancelled` before every iteration
    /// and returns `None` as soon as it reports `true`.
    ///
    /// A cancelled call leaves the weights partially trained.
    #[expect(clippy::cast_precision_loss)]
    pub fn train_interruptible<R, F>(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView2<'_, f64>,
        params: &TrainParams,
        rng: &mut R,
        is_cancelled: F,
    ) -> Option<f64>
    where
        R: Rng + ?Sized,
        F: Fn() -> bool,
    {
        if params.iterations == 0 {
            return Some(0.0);
        }

        let mut learn_rate = params.learn_rate;
        let mut error_sum = 0.0;
        for _ in 0..params.iterations {
            if is_cancelled() {
                return None;
            }
            let Activations {
                hidden1,
                hidden2,
                output,
            } = self.forward(inputs, params.dropout_percent, rng);

            let error = &targets - &output;
            error_sum += mean_abs(&error);

            let [w1, w2, w3] = &mut self.layers;
            let delta3 = error * output.mapv(squash_gradient);
            let delta2 = delta3.dot(&w3.weights.t()) * hidden2.mapv(squash_gradient);
            let delta1 = delta2.dot(&w2.weights.t()) * hidden1.mapv(squash_gradient);

            w1.weights.scaled_add(learn_rate, &inputs.t().dot(&delta1));
            w2.weights.scaled_add(learn_rate, &hidden1.t().dot(&delta2));
            w3.weights.scaled_add(learn_rate, &hidden2.t().dot(&delta3));

            learn_rate /= params.learn_decay;
        }
        Some(error_sum / params.iterations as f64)
    }

    /// Deterministic evaluation against labelled data.
    #[must_use]
    pub fn evaluate(&self, inputs: ArrayView2<'_, f64>, targets: ArrayView2<'_, f64>) -> Evaluation {
        let predictions = self.predict(inputs);
        let errors = &targets - &predictions;
        let summary = ErrorSummary {
            mean_abs_error: mean_abs(&errors),
            low_saturated: errors.iter().filter(|e| **e < -SATURATION_THRESHOLD).count(),
            high_saturated: errors.iter().filter(|e| **e > SATURATION_THRESHOLD).count(),
        };
        Evaluation {
            predictions,
            errors,
            summary,
        }
    }
}

fn random_matrix<R>(
    (rows, cols): (usize, usize),
    sizes: LayerSizes,
    rng: &mut R,
) -> Result<Array2<f64>, ResourceError>
where
    R: Rng + ?Sized,
{
    let len = rows.checked_mul(cols).ok_or(ResourceError { sizes })?;
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|_| ResourceError { sizes })?;
    values.extend((0..len).map(|_| rng.random_range(-1.0..=1.0)));
    Array2::from_shape_vec((rows, cols), values).map_err(|_| ResourceError { sizes })
}

fn drop_out<R>(activation: &Array2<f64>, dropout_percent: u32, rng: &mut R) -> Array2<f64>
where
    R: Rng + ?Sized,
{
    if dropout_percent == 0 {
        return activation.clone();
    }
    let keep = f64::from(100 - dropout_percent.min(100)) / 100.0;
    activation.mapv(|a| if rng.random_bool(keep) { a } else { 0.0 })
}

fn mean_abs(errors: &Array2<f64>) -> f64 {
    errors.mapv(f64::abs).mean().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use rand::SeedableRng as _;

    use super::*;

    /// Two-bit inputs whose target is the first bit.
    fn first_bit_data() -> (Array2<f64>, Array2<f64>) {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![[0.0], [0.0], [1.0], [1.0]];
        (x, y)
    }

    #[test]
    fn test_same_seed_same_network() {
        let sizes = LayerSizes::new(4, 8, 4);
        let a = Network::new(sizes, 99).unwrap();
        let b = Network::new(sizes, 99).unwrap();
        assert_eq!(a, b);
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.alleles(), lb.alleles());
        }
        let c = Network::new(sizes, 100).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_construct_shapes_and_ranges() {
        let network = Network::new(LayerSizes::new(3, 7, 2), 1).unwrap();
        let shapes: Vec<_> = network.layers().iter().map(WeightLayer::shape).collect();
        assert_eq!(shapes, vec![(3, 7), (7, 7), (7, 2)]);
        assert_eq!(network.sizes(), LayerSizes::new(3, 7, 2));
        for layer in network.layers() {
            assert!(layer.flat_values().all(|w| (-1.0..=1.0).contains(&w)));
            assert_eq!(layer.alleles().covered_len(), layer.len());
        }
    }

    #[test]
    fn test_construct_rejects_overflowing_sizes() {
        let sizes = LayerSizes::new(usize::MAX, 2, 1);
        assert!(Network::new(sizes, 0).is_err());
    }

    #[test]
    fn test_squash_bounds() {
        for x in [-1e6, -800.0, -40.0, -1.0, 0.0, 1.0, 40.0, 800.0, 1e6] {
            let y = squash(x);
            assert!(y > 0.0 && y < 1.0, "squash({x}) = {y}");
        }
        assert!((squash(0.0) - 0.5).abs() < 1e-12);
        assert!((squash_gradient(0.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_predict_output_is_open_unit_interval() {
        let network = Network::new(LayerSizes::new(3, 6, 2), 5).unwrap();
        let x = array![[1e9, -1e9, 0.0], [0.0, 0.0, 0.0], [-3.0, 2.0, 1.0]];
        let out = network.predict(x.view());
        assert!(out.iter().all(|v| *v > 0.0 && *v < 1.0));
    }

    #[test]
    fn test_forward_without_dropout_matches_predict() {
        let network = Network::new(LayerSizes::new(2, 5, 1), 8).unwrap();
        let (x, _) = first_bit_data();
        let mut rng = Pcg32::seed_from_u64(0);
        let activations = network.forward(x.view(), 0, &mut rng);
        assert_eq!(activations.output, network.predict(x.view()));
    }

    #[test]
    fn test_full_dropout_silences_hidden_inputs() {
        // with every hidden activation dropped the output is squash(0) everywhere
        let network = Network::new(LayerSizes::new(2, 5, 3), 8).unwrap();
        let (x, _) = first_bit_data();
        let mut rng = Pcg32::seed_from_u64(0);
        let activations = network.forward(x.view(), 100, &mut rng);
        assert!(activations.output.iter().all(|v| (*v - 0.5).abs() < 1e-12));
        assert!(activations.hidden1.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_train_reduces_error() {
        let (x, y) = first_bit_data();
        let mut network = Network::new(LayerSizes::new(2, 8, 1), 3).unwrap();
        let before = network.evaluate(x.view(), y.view()).summary.mean_abs_error;
        let params = TrainParams {
            iterations: 2000,
            dropout_percent: 0,
            learn_rate: 0.5,
            learn_decay: 1.0,
        };
        let mut rng = Pcg32::seed_from_u64(0);
        let trained = network.train(x.view(), y.view(), &params, &mut rng);
        let after = network.evaluate(x.view(), y.view()).summary.mean_abs_error;
        assert!(trained.is_finite());
        assert!(after < before, "error {before} -> {after}");
    }

    #[test]
    fn test_train_zero_iterations_is_noop() {
        let (x, y) = first_bit_data();
        let mut network = Network::new(LayerSizes::new(2, 4, 1), 3).unwrap();
        let original = network.clone();
        let params = TrainParams {
            iterations: 0,
            dropout_percent: 0,
            learn_rate: 0.1,
            learn_decay: 1.0,
        };
        let error = network.train(x.view(), y.view(), &params, &mut Pcg32::seed_from_u64(0));
        assert!(error.abs() < f64::EPSILON);
        assert_eq!(network, original);
    }

    #[test]
    fn test_train_is_deterministic_for_seeded_dropout() {
        let (x, y) = first_bit_data();
        let params = TrainParams {
            iterations: 50,
            dropout_percent: 20,
            learn_rate: 0.1,
            learn_decay: 1.001,
        };
        let mut a = Network::new(LayerSizes::new(2, 6, 1), 4).unwrap();
        let mut b = a.clone();
        a.train(x.view(), y.view(), &params, &mut Pcg32::seed_from_u64(12));
        b.train(x.view(), y.view(), &params, &mut Pcg32::seed_from_u64(12));
        assert_eq!(a, b);
    }

    #[test]
    fn test_train_interruptible_stops() {
        let (x, y) = first_bit_data();
        let mut network = Network::new(LayerSizes::new(2, 4, 1), 3).unwrap();
        let params = TrainParams {
            iterations: 10,
            dropout_percent: 0,
            learn_rate: 0.1,
            learn_decay: 1.0,
        };
        let result =
            network.train_interruptible(x.view(), y.view(), &params, &mut Pcg32::seed_from_u64(0), || true);
        assert!(result.is_none());
    }

    #[test]
    fn test_evaluate_counts_saturated_errors() {
        let network = Network::new(LayerSizes::new(2, 4, 2), 3).unwrap();
        let x = array![[0.0, 1.0]];
        let predictions = network.predict(x.view());
        // targets a full unit away from each prediction saturate on purpose
        let low = predictions.mapv(|p| p - 1.0);
        let high = predictions.mapv(|p| p + 1.0);

        let eval = network.evaluate(x.view(), low.view());
        assert_eq!(eval.summary.low_saturated, 2);
        assert_eq!(eval.summary.high_saturated, 0);
        assert!((eval.summary.mean_abs_error - 1.0).abs() < 1e-9);

        let eval = network.evaluate(x.view(), high.view());
        assert_eq!(eval.summary.low_saturated, 0);
        assert_eq!(eval.summary.high_saturated, 2);

        let eval = network.evaluate(x.view(), predictions.view());
        assert!(eval.summary.mean_abs_error.abs() < 1e-12);
        assert_eq!(eval.errors.dim(), (1, 2));
    }

    #[test]
    fn test_from_layers_round_trip() {
        let network = Network::new(LayerSizes::new(3, 5, 2), 21).unwrap();
        let layers = network.layers().clone().map(|layer| {
            let shape = layer.shape();
            let values = layer.flat_values().collect();
            let alleles = layer.alleles().iter().map(<[usize]>::to_vec).collect();
            (shape, values, alleles)
        });
        let [a, b, c] = layers;
        let rebuilt = Network::from_layers([
            WeightLayer::from_parts(0, a.0, a.1, a.2).unwrap(),
            WeightLayer::from_parts(1, b.0, b.1, b.2).unwrap(),
            WeightLayer::from_parts(2, c.0, c.1, c.2).unwrap(),
        ])
        .unwrap();
        assert_eq!(rebuilt, network);
    }

    #[test]
    fn test_from_layers_rejects_broken_chain() {
        let a = Network::new(LayerSizes::new(3, 5, 2), 1).unwrap();
        let b = Network::new(LayerSizes::new(3, 6, 2), 1).unwrap();
        let [l0, _, l2] = a.layers().clone();
        let [_, l1, _] = b.layers().clone();
        assert!(matches!(
            Network::from_layers([l0, l1, l2]),
            Err(NetworkError::ShapeMismatch { layer: 1, .. })
        ));
    }
}
