//! Loss factor schedule.
//!
//! The similarity factor is constant; the regularization factor stays at its
//! initial value for `static_epoch` iterations and then decays along a
//! sigmoid towards a floor, so that the fit tightens as the optimisation
//! settles.

use burn::config::Config;

use crate::error::{RegistrationError, Result};

/// `1` before `static_epoch`, then `k / (k + exp((iter - static_epoch) / k))`.
pub fn sigmoid_decay(iter: usize, static_epoch: usize, k: f64) -> f64 {
    if iter < static_epoch {
        1.0
    } else {
        let t = (iter - static_epoch) as f64 / k;
        k / (k + t.exp())
    }
}

/// Factors of the combined objective `sim_factor * sim + reg_factor * reg`.
#[derive(Config, Debug, PartialEq)]
pub struct RegFactorScheduleConfig {
    #[config(default = 100.0)]
    pub sim_factor: f64,
    #[config(default = 1.0)]
    pub reg_factor_init: f64,
    /// Floor of the regularization factor. `reg_factor_init / 10` when unset.
    pub reg_factor_min: Option<f64>,
    /// Iterations before the decay starts.
    #[config(default = 100)]
    pub static_epoch: usize,
    /// Decay scale of the sigmoid.
    #[config(default = 8.0)]
    pub decay_k: f64,
}

impl RegFactorScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sim_factor >= 0.0 && self.reg_factor_init >= 0.0) {
            return Err(RegistrationError::invalid_configuration(
                "loss factors must be non-negative",
            ));
        }
        if !(self.decay_k > 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "decay_k must be positive, got {}",
                self.decay_k
            )));
        }
        if self.min_threshold() > self.reg_factor_init {
            return Err(RegistrationError::invalid_configuration(
                "reg_factor_min exceeds reg_factor_init",
            ));
        }
        Ok(())
    }

    pub fn min_threshold(&self) -> f64 {
        self.reg_factor_min.unwrap_or(self.reg_factor_init / 10.0)
    }

    /// Regularization factor at local iteration `iter`.
    pub fn reg_factor(&self, iter: usize) -> f64 {
        let decayed = self.reg_factor_init * sigmoid_decay(iter, self.static_epoch, self.decay_k);
        decayed.max(self.min_threshold())
    }

    /// `(sim_factor, reg_factor)` at local iteration `iter`.
    pub fn factors(&self, iter: usize) -> (f64, f64) {
        (self.sim_factor, self.reg_factor(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let config = RegFactorScheduleConfig::new();
        assert_eq!(config.factors(0), (100.0, 1.0));
        assert_eq!(config.reg_factor(99), 1.0);
        assert!(config.reg_factor(100) < 1.0);
        assert!((config.reg_factor(10_000) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(RegFactorScheduleConfig::new().with_decay_k(0.0).validate().is_err());
        assert!(RegFactorScheduleConfig::new()
            .with_reg_factor_min(Some(2.0))
            .validate()
            .is_err());
    }

    proptest! {
        #[test]
        fn reg_factor_is_non_increasing(
            static_epoch in 0usize..200,
            decay_k in 0.5f64..50.0,
            init in 0.01f64..10.0,
            iter in 0usize..2_000,
        ) {
            let config = RegFactorScheduleConfig::new()
                .with_static_epoch(static_epoch)
                .with_decay_k(decay_k)
                .with_reg_factor_init(init);
            let now = config.reg_factor(iter);
            let next = config.reg_factor(iter + 1);
            prop_assert!(next <= now);
            prop_assert!(now >= config.min_threshold());
        }

        #[test]
        fn reg_factor_reaches_floor(
            static_epoch in 0usize..200,
            decay_k in 0.5f64..20.0,
        ) {
            let config = RegFactorScheduleConfig::new()
                .with_static_epoch(static_epoch)
                .with_decay_k(decay_k);
            let late = config.reg_factor(static_epoch + (decay_k * 200.0) as usize);
            prop_assert!((late - config.min_threshold()).abs() < 1e-9);
        }
    }
}
