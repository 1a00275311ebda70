//! Dense Levenberg–Marquardt least squares for small parameter vectors.
//!
//! The tuning-curve fits only ever solve for 3 or 6 parameters over a few
//! dozen samples, so a plain damped-normal-equations implementation with an
//! analytic Jacobian is all that is needed. The residual covariance at the
//! solution is exposed for parameter-variance estimates.

use nalgebra::{DMatrix, DVector};

#[derive(Clone, Debug)]
pub struct LevMarOptions {
    pub max_iter: usize,
    /// Relative cost-reduction tolerance.
    pub ftol: f64,
    /// Step-size tolerance relative to the parameter norm.
    pub xtol: f64,
    /// Initial damping factor.
    pub lambda0: f64,
}

impl Default for LevMarOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            lambda0: 1e-3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LevMarFit {
    pub params: DVector<f64>,
    /// Residual sum of squares at the solution.
    pub cost: f64,
    pub iterations: usize,
    /// `(JᵀJ)⁻¹ · s²` at the solution; `None` when the normal matrix is
    /// singular or there are no degrees of freedom left.
    pub covariance: Option<DMatrix<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevMarError {
    DidNotConverge,
}

impl std::fmt::Display for LevMarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevMarError::DidNotConverge => write!(f, "least-squares fit did not converge"),
        }
    }
}

impl std::error::Error for LevMarError {}

const LAMBDA_GROW: f64 = 4.0;
const LAMBDA_SHRINK: f64 = 0.25;
const LAMBDA_MAX: f64 = 1e12;
const GRADIENT_TOL: f64 = 1e-10;

/// Minimize `|r(p)|²` starting from `p0`.
///
/// `residuals` maps parameters to the residual vector, `jacobian` to the
/// matrix of residual partial derivatives (rows follow the residuals).
pub fn least_squares<R, J>(
    p0: DVector<f64>,
    residuals: R,
    jacobian: J,
    opts: &LevMarOptions,
) -> Result<LevMarFit, LevMarError>
where
    R: Fn(&DVector<f64>) -> DVector<f64>,
    J: Fn(&DVector<f64>) -> DMatrix<f64>,
{
    let n = p0.len();
    let mut p = p0;
    let mut r = residuals(&p);
    let m = r.len();
    let mut cost = r.norm_squared();
    let mut lambda = opts.lambda0;
    let mut converged = cost == 0.0;
    let mut iterations = 0;

    while !converged && iterations < opts.max_iter {
        iterations += 1;
        let jac = jacobian(&p);
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &r;

        if jtr.amax() < GRADIENT_TOL {
            converged = true;
            break;
        }

        let mut stepped = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            if let Some(chol) = damped.cholesky() {
                let delta = chol.solve(&jtr);
                let candidate = &p - &delta;
                let rc = residuals(&candidate);
                let cost_c = rc.norm_squared();
                if cost_c.is_finite() && cost_c < cost {
                    let drop = cost - cost_c;
                    let step = delta.norm();
                    p = candidate;
                    r = rc;
                    if drop <= opts.ftol * cost.max(f64::MIN_POSITIVE)
                        || step <= opts.xtol * (p.norm() + opts.xtol)
                    {
                        converged = true;
                    }
                    cost = cost_c;
                    lambda = (lambda * LAMBDA_SHRINK).max(1e-14);
                    stepped = true;
                    break;
                }
            }
            lambda *= LAMBDA_GROW;
        }

        if !stepped {
            // Damping is saturated and no downhill step exists.
            return Err(LevMarError::DidNotConverge);
        }
    }

    if !converged {
        return Err(LevMarError::DidNotConverge);
    }

    let covariance = if m > n {
        let jac = jacobian(&p);
        let jtj = jac.transpose() * &jac;
        let s2 = cost / (m - n) as f64;
        jtj.cholesky().map(|chol| chol.inverse() * s2)
    } else {
        None
    };

    Ok(LevMarFit {
        params: p,
        cost,
        iterations,
        covariance,
    })
}
