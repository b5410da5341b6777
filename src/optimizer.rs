//! Optimizers
//!
//! Each optimizer owns whatever running state it needs (velocity, squared
//! gradient cache, moment estimates) shaped to match the parameters it
//! updates. State is lazily shaped on the first call, so a freshly built
//! layer doesn't need to tell its optimizer the parameter shapes up front.
//!
//! `update` takes the weight and bias matrices as two separate `&mut`
//! borrows, which is exactly what a layer can hand over from its own fields.

use crate::matrix::Matrix;

const MOMENTUM_BETA: f64 = 0.9;
const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Which optimizer a layer should be built with.
///
/// The builder takes a kind rather than an [`Optimizer`] value so that every
/// layer gets its own fresh state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Momentum,
    Adagrad,
    Adam,
}

impl OptimizerKind {
    pub fn build(self) -> Optimizer {
        match self {
            OptimizerKind::Sgd => Optimizer::Sgd,
            OptimizerKind::Momentum => Optimizer::Momentum {
                velocity_w: None,
                velocity_b: None,
            },
            OptimizerKind::Adagrad => Optimizer::Adagrad {
                cache_w: None,
                cache_b: None,
            },
            OptimizerKind::Adam => Optimizer::Adam {
                m_w: None,
                v_w: None,
                m_b: None,
                v_b: None,
                t: 0,
            },
        }
    }
}

/// A gradient-descent update rule with its running state.
#[derive(Clone, Debug)]
pub enum Optimizer {
    /// `θ ← θ − lr·g`
    Sgd,
    /// `v ← β·v + lr·g`, `θ ← θ − v` with β = 0.9. The learning rate is
    /// folded into the accumulated velocity, so a schedule that changes `lr`
    /// mid-run decays the old steps at their old rates.
    Momentum {
        velocity_w: Option<Matrix>,
        velocity_b: Option<Matrix>,
    },
    /// Per-parameter learning rates from the accumulated squared gradient.
    Adagrad {
        cache_w: Option<Matrix>,
        cache_b: Option<Matrix>,
    },
    /// Bias-corrected first and second moment estimates
    /// (β1 = 0.9, β2 = 0.999).
    Adam {
        m_w: Option<Matrix>,
        v_w: Option<Matrix>,
        m_b: Option<Matrix>,
        v_b: Option<Matrix>,
        t: u64,
    },
}

impl Optimizer {
    /// Apply one update step to a weight/bias pair from their gradients.
    pub fn update(
        &mut self,
        weights: &mut Matrix,
        biases: &mut Matrix,
        dw: &Matrix,
        db: &Matrix,
        lr: f64,
    ) {
        match self {
            Optimizer::Sgd => {
                weights.sub_in_place(&dw.scale(lr));
                biases.sub_in_place(&db.scale(lr));
            }
            Optimizer::Momentum {
                velocity_w,
                velocity_b,
            } => {
                Self::momentum_step(weights, velocity_w, dw, lr);
                Self::momentum_step(biases, velocity_b, db, lr);
            }
            Optimizer::Adagrad { cache_w, cache_b } => {
                Self::adagrad_step(weights, cache_w, dw, lr);
                Self::adagrad_step(biases, cache_b, db, lr);
            }
            Optimizer::Adam {
                m_w,
                v_w,
                m_b,
                v_b,
                t,
            } => {
                *t += 1;
                Self::adam_step(weights, m_w, v_w, dw, lr, *t);
                Self::adam_step(biases, m_b, v_b, db, lr, *t);
            }
        }
    }

    fn momentum_step(param: &mut Matrix, velocity: &mut Option<Matrix>, grad: &Matrix, lr: f64) {
        let v = velocity.get_or_insert_with(|| Matrix::zeros(grad.rows(), grad.cols()));
        v.scale_in_place(MOMENTUM_BETA);
        v.add_in_place(&grad.scale(lr));
        param.sub_in_place(v);
    }

    fn adagrad_step(param: &mut Matrix, cache: &mut Option<Matrix>, grad: &Matrix, lr: f64) {
        let c = cache.get_or_insert_with(|| Matrix::zeros(grad.rows(), grad.cols()));
        c.add_in_place(&grad.square());
        let step = grad.hadamard(&c.sqrt().add_scalar(EPSILON).recip());
        param.sub_in_place(&step.scale(lr));
    }

    fn adam_step(
        param: &mut Matrix,
        m: &mut Option<Matrix>,
        v: &mut Option<Matrix>,
        grad: &Matrix,
        lr: f64,
        t: u64,
    ) {
        let m = m.get_or_insert_with(|| Matrix::zeros(grad.rows(), grad.cols()));
        let v = v.get_or_insert_with(|| Matrix::zeros(grad.rows(), grad.cols()));

        m.scale_in_place(ADAM_BETA1);
        m.add_in_place(&grad.scale(1.0 - ADAM_BETA1));
        v.scale_in_place(ADAM_BETA2);
        v.add_in_place(&grad.square().scale(1.0 - ADAM_BETA2));

        let m_hat = m.scale(1.0 / (1.0 - ADAM_BETA1.powi(t as i32)));
        let v_hat = v.scale(1.0 / (1.0 - ADAM_BETA2.powi(t as i32)));

        let step = m_hat.hadamard(&v_hat.sqrt().add_scalar(EPSILON).recip());
        param.sub_in_place(&step.scale(lr));
    }
}
