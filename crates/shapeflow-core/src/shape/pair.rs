//! Mutable registration state: source, target, control points and momentum.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::reg_param::RegParam;
use super::shape::Shape;
use crate::error::{CoreError, Result};
use crate::geometry::check_compatible;

/// The shape pair a registration model optimizes.
///
/// The pair is the single owner of per-iteration state. The momentum
/// (`reg_param`) lives on the control points; shooting produces
/// `flowed_control_points`, flowing produces `flowed` (the `toflow` shape,
/// by default the source, advected by the same velocity field).
///
/// Every call to [`ShapePair::set_reg_param`] bumps a version counter;
/// flowed results remember the version they were computed for so that
/// consumers can tell whether they are stale.
#[derive(Debug, Clone)]
pub struct ShapePair<B: Backend> {
    source: Shape<B>,
    target: Shape<B>,
    toflow: Option<Shape<B>>,
    control_points: Tensor<B, 3>,
    control_weights: Tensor<B, 3>,
    reg_param: Option<RegParam<B>>,
    flowed: Option<Shape<B>>,
    flowed_control_points: Option<Tensor<B, 3>>,
    dense_mode: bool,
    param_version: u64,
    flowed_version: Option<u64>,
    flowed_control_points_version: Option<u64>,
}

impl<B: Backend> ShapePair<B> {
    /// Create a pair whose control points are the source points (dense mode).
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if source and target differ in batch size or
    /// spatial dimension.
    pub fn new(source: Shape<B>, target: Shape<B>) -> Result<Self> {
        check_compatible("shape pair", source.points(), target.points())?;
        let control_points = source.points().clone();
        let control_weights = source.weights().clone();
        Ok(Self {
            source,
            target,
            toflow: None,
            control_points,
            control_weights,
            reg_param: None,
            flowed: None,
            flowed_control_points: None,
            dense_mode: true,
            param_version: 0,
            flowed_version: None,
            flowed_control_points_version: None,
        })
    }

    /// Replace source and target; control points fall back to the source points.
    pub fn set_source_and_target(&mut self, source: Shape<B>, target: Shape<B>) -> Result<()> {
        *self = Self::new(source, target)?;
        Ok(())
    }

    /// Use externally sampled control points instead of the source points.
    ///
    /// Resets the momentum, which no longer matches the control point layout.
    pub fn set_control_points(&mut self, control_points: Tensor<B, 3>, weights: Option<Tensor<B, 3>>) -> Result<()> {
        check_compatible("control points", self.source.points(), &control_points)?;
        let [b, n, _] = control_points.dims();
        let weights = match weights {
            Some(weights) => {
                if weights.dims() != [b, n, 1] {
                    return Err(CoreError::shape_mismatch("control weights", [b, n, 1], weights.dims()));
                }
                weights
            }
            None => Tensor::ones([b, n, 1], &control_points.device()).div_scalar(n as f64),
        };
        self.control_points = control_points;
        self.control_weights = weights;
        self.dense_mode = false;
        self.reg_param = None;
        self.invalidate();
        Ok(())
    }

    /// Carry a different shape than the source through the flow.
    pub fn set_toflow(&mut self, toflow: Shape<B>) -> Result<()> {
        check_compatible("toflow", self.source.points(), toflow.points())?;
        self.toflow = Some(toflow);
        self.flowed = None;
        self.flowed_version = None;
        Ok(())
    }

    /// Set the momentum; its layout must match the control points.
    pub fn set_reg_param(&mut self, reg_param: RegParam<B>) -> Result<()> {
        let expected = self.control_points.dims();
        let actual = reg_param.dims();
        if expected != actual {
            return Err(CoreError::shape_mismatch("reg_param", expected, actual));
        }
        self.reg_param = Some(reg_param);
        self.param_version += 1;
        Ok(())
    }

    /// Move the momentum out of the pair (e.g. to hand it to an optimizer).
    pub fn take_reg_param(&mut self) -> Result<RegParam<B>> {
        self.reg_param
            .take()
            .ok_or_else(|| CoreError::invalid_configuration("the shape pair has no reg_param"))
    }

    pub fn reg_param(&self) -> Option<&RegParam<B>> {
        self.reg_param.as_ref()
    }

    /// Record the shooting result for the current momentum.
    pub fn set_flowed_control_points(&mut self, flowed_control_points: Tensor<B, 3>) -> Result<()> {
        let expected = self.control_points.dims();
        if flowed_control_points.dims() != expected {
            return Err(CoreError::shape_mismatch(
                "flowed control points",
                expected,
                flowed_control_points.dims(),
            ));
        }
        self.flowed_control_points = Some(flowed_control_points);
        self.flowed_control_points_version = Some(self.param_version);
        Ok(())
    }

    /// Record the flow result for the current momentum.
    pub fn set_flowed(&mut self, flowed: Shape<B>) -> Result<()> {
        let expected = self.toflow_shape().points().dims();
        if flowed.points().dims() != expected {
            return Err(CoreError::shape_mismatch("flowed", expected, flowed.points().dims()));
        }
        self.flowed = Some(flowed);
        self.flowed_version = Some(self.param_version);
        Ok(())
    }

    /// Whether `flowed` reflects the current momentum, filling it in from the
    /// shooting result when that is enough.
    ///
    /// In dense mode without a separate `toflow` shape the control points are
    /// exactly the points to move, so the shot control points are the flowed
    /// points and no extra flow pass is needed.
    pub fn infer_flowed(&mut self) -> bool {
        if self.flowed_is_current() {
            return true;
        }
        let shot_is_current = self.flowed_control_points_version == Some(self.param_version);
        if self.dense_mode && self.toflow.is_none() && shot_is_current {
            if let Some(points) = self.flowed_control_points.clone() {
                if let Ok(flowed) = Shape::with_reference(points, &self.source) {
                    self.flowed = Some(flowed);
                    self.flowed_version = Some(self.param_version);
                    return true;
                }
            }
        }
        false
    }

    /// Whether `flowed` was computed for the current momentum.
    pub fn flowed_is_current(&self) -> bool {
        self.flowed.is_some() && self.flowed_version == Some(self.param_version)
    }

    fn invalidate(&mut self) {
        self.flowed = None;
        self.flowed_control_points = None;
        self.flowed_version = None;
        self.flowed_control_points_version = None;
    }

    pub fn source(&self) -> &Shape<B> {
        &self.source
    }

    pub fn target(&self) -> &Shape<B> {
        &self.target
    }

    pub fn toflow(&self) -> Option<&Shape<B>> {
        self.toflow.as_ref()
    }

    /// The shape advected by `flow`: `toflow` when set, otherwise the source.
    pub fn toflow_shape(&self) -> &Shape<B> {
        self.toflow.as_ref().unwrap_or(&self.source)
    }

    pub fn toflow_points(&self) -> Tensor<B, 3> {
        self.toflow_shape().points().clone()
    }

    pub fn control_points(&self) -> Tensor<B, 3> {
        self.control_points.clone()
    }

    pub fn control_weights(&self) -> Tensor<B, 3> {
        self.control_weights.clone()
    }

    pub fn flowed(&self) -> Option<&Shape<B>> {
        self.flowed.as_ref()
    }

    pub fn flowed_control_points(&self) -> Option<&Tensor<B, 3>> {
        self.flowed_control_points.as_ref()
    }

    /// Whether the control points are the source points.
    pub fn dense_mode(&self) -> bool {
        self.dense_mode
    }
}
