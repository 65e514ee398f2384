//! Calibration curve fitting: weighted least squares under a closed set of
//! regression strategies.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// One observation used for curve fitting.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct WeightedPoint {
    /// The known concentration.
    pub x: f64,
    /// The observed (normalized) peak area.
    pub y: f64,
    /// The weight of this observation in the least squares solve.
    pub weight: f64,
}

/// How calibration points are weighted, giving low-concentration standards
/// more or less influence on the fit.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
pub enum RegressionWeighting {
    /// Every point weighs 1.
    #[default]
    None,
    /// Weight 1/x.
    OneOverX,
    /// Weight 1/x².
    OneOverXSquared,
}

impl RegressionWeighting {
    /// Parse the historical name of a weighting. Unrecognized or absent
    /// names fall back to [`Self::None`].
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("1/x") => Self::OneOverX,
            Some("1/(x*x)") => Self::OneOverXSquared,
            _ => Self::None,
        }
    }

    /// The weight of a point at the given x. Non-positive x falls back to
    /// weight 1 so blank-level standards cannot poison the solve.
    pub fn weight(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 1.0;
        }
        match self {
            Self::None => 1.0,
            Self::OneOverX => 1.0 / x,
            Self::OneOverXSquared => 1.0 / (x * x),
        }
    }
}

impl std::fmt::Display for RegressionWeighting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "none",
                Self::OneOverX => "1/x",
                Self::OneOverXSquared => "1/(x*x)",
            }
        )
    }
}

/// A fitted calibration curve. A curve with `point_count` 0 or a populated
/// `error` carries no trustworthy coefficients and cannot back-calculate
/// concentrations.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CalibrationCurve {
    /// Constant coefficient, absent for fits without an intercept.
    pub intercept: Option<f64>,
    /// Linear coefficient.
    pub slope: Option<f64>,
    /// Quadratic coefficient, only present for quadratic fits.
    pub quadratic_coefficient: Option<f64>,
    /// Number of points the curve was fitted through.
    pub point_count: usize,
    /// Coefficient of determination over the input points. Stays unset when
    /// it could not be computed, which is distinct from 0.
    pub r_squared: Option<f64>,
    /// Populated instead of the coefficients when the fit failed.
    pub error: Option<String>,
}

impl CalibrationCurve {
    /// A curve that only carries an error message.
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether the curve can be used to back-calculate concentrations.
    pub fn is_usable(&self) -> bool {
        self.point_count > 0 && self.error.is_none()
    }

    /// The fitted y at the given x, if the curve has coefficients.
    pub fn y(&self, x: f64) -> Option<f64> {
        let slope = self.slope?;
        let intercept = self.intercept.unwrap_or(0.0);
        Some(match self.quadratic_coefficient {
            Some(quadratic) => quadratic * x * x + slope * x + intercept,
            None => slope * x + intercept,
        })
    }

    /// The concentration whose fitted y equals the given value, reading the
    /// curve backwards. `None` for unusable curves, a zero slope, or a
    /// quadratic with a negative discriminant. Quadratic curves take the
    /// positive branch root.
    pub fn x(&self, y: f64) -> Option<f64> {
        if !self.is_usable() {
            return None;
        }
        let slope = self.slope?;
        let intercept = self.intercept.unwrap_or(0.0);
        match self.quadratic_coefficient {
            Some(quadratic) if quadratic != 0.0 => {
                let discriminant = slope * slope - 4.0 * quadratic * (intercept - y);
                (discriminant >= 0.0)
                    .then(|| (-slope + discriminant.sqrt()) / (2.0 * quadratic))
            }
            _ => (slope != 0.0).then(|| (y - intercept) / slope),
        }
    }
}

/// The curve fitting strategies. Selected by name, dispatched through
/// [`Self::fit`].
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
pub enum RegressionFit {
    /// Calibration disabled: every fit reports 0 points and slope 1.
    #[default]
    None,
    /// Weighted least squares of y on x with an intercept.
    Linear,
    /// Weighted least squares of y on x with the intercept forced to 0.
    LinearThroughZero,
    /// Weighted least squares of y on x and x² with an intercept.
    Quadratic,
}

impl RegressionFit {
    /// Parse the historical name of a regression fit. Unrecognized or
    /// absent names fall back to [`Self::None`].
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("linear") => Self::Linear,
            Some("linear_through_zero") => Self::LinearThroughZero,
            Some("quadratic") => Self::Quadratic,
            _ => Self::None,
        }
    }

    /// Fit a curve through the given points.
    ///
    /// An empty point list and a failed solve both produce a curve whose
    /// error message is populated; neither ever panics or propagates an
    /// error. On success R² is computed over the input points.
    pub fn fit(&self, points: &[WeightedPoint]) -> CalibrationCurve {
        let (with_intercept, with_quadratic) = match self {
            Self::None => {
                return CalibrationCurve {
                    slope: Some(1.0),
                    ..CalibrationCurve::default()
                };
            }
            Self::Linear => (true, false),
            Self::LinearThroughZero => (false, false),
            Self::Quadratic => (true, true),
        };
        if points.is_empty() {
            return CalibrationCurve::with_error(
                "unable to fit calibration curve: no data points",
            );
        }
        let mut curve = match weighted_regression(points, with_intercept, with_quadratic) {
            Ok(coefficients) => {
                let mut remaining = coefficients.into_iter();
                let intercept = with_intercept.then(|| remaining.next().unwrap_or(0.0));
                let slope = remaining.next();
                let quadratic_coefficient = with_quadratic.then(|| remaining.next().unwrap_or(0.0));
                CalibrationCurve {
                    intercept,
                    slope,
                    quadratic_coefficient,
                    point_count: points.len(),
                    r_squared: None,
                    error: None,
                }
            }
            Err(message) => CalibrationCurve::with_error(message),
        };
        if curve.error.is_none() {
            curve.r_squared = r_squared(&curve, points);
        }
        curve
    }
}

impl std::fmt::Display for RegressionFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "none",
                Self::Linear => "linear",
                Self::LinearThroughZero => "linear_through_zero",
                Self::Quadratic => "quadratic",
            }
        )
    }
}

/// Solve the weighted normal equations (XᵀWX)β = XᵀWy with W the diagonal
/// of the point weights. The design matrix holds, in order, the optional
/// intercept column of ones, the x column, and the optional x² column, so
/// the coefficients come out as [intercept, linear, quadratic] as present.
fn weighted_regression(
    points: &[WeightedPoint],
    with_intercept: bool,
    with_quadratic: bool,
) -> Result<Vec<f64>, String> {
    let columns = 1 + usize::from(with_intercept) + usize::from(with_quadratic);
    let design = DMatrix::from_fn(points.len(), columns, |row, column| {
        let x = points[row].x;
        let mut column = column;
        if with_intercept {
            if column == 0 {
                return 1.0;
            }
            column -= 1;
        }
        if column == 0 { x } else { x * x }
    });
    let weights = DMatrix::from_diagonal(&DVector::from_iterator(
        points.len(),
        points.iter().map(|point| point.weight),
    ));
    let observations = DVector::from_iterator(points.len(), points.iter().map(|point| point.y));
    let weighted_design = design.transpose() * &weights;
    let normal = &weighted_design * &design;
    let right_hand_side = weighted_design * observations;
    normal
        .lu()
        .solve(&right_hand_side)
        .map(|solution| solution.iter().copied().collect())
        .ok_or_else(|| "singular design matrix in weighted regression".to_string())
}

/// R² = 1 − RSS/TSS over the points the curve can predict a y for. Unset
/// when no point yields a valid fitted y or the total sum of squares
/// degenerates.
fn r_squared(curve: &CalibrationCurve, points: &[WeightedPoint]) -> Option<f64> {
    let predicted: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|point| curve.y(point.x).map(|fitted| (point.y, fitted)))
        .collect();
    if predicted.is_empty() {
        return None;
    }
    let mean = predicted.iter().map(|(observed, _)| observed).sum::<f64>() / predicted.len() as f64;
    let residual: f64 = predicted
        .iter()
        .map(|(observed, fitted)| (observed - fitted) * (observed - fitted))
        .sum();
    let total: f64 = predicted
        .iter()
        .map(|(observed, _)| (observed - mean) * (observed - mean))
        .sum();
    let value = 1.0 - residual / total;
    value.is_finite().then_some(value)
}
