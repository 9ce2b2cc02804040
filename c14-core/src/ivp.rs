//! Initial value problems solved with `ode_solvers`.
//!
//! Anything implementing [`IVP`] can be wrapped in an [`IVPBuilder`] and
//! handed to one of the explicit solvers.

use crate::errors::{C14Error, C14Result};
use crate::timeseries::{FloatValue, Time};
use is_close::is_close;
use nalgebra::DVector;
use ode_solvers::dop_shared::SolverResult;
use ode_solvers::{Rk4, System};
use std::sync::Arc;

pub type ModelState = DVector<FloatValue>;

pub trait IVP<T, S> {
    /// Writes the time derivative of `y` at `t` into `dy_dt`.
    fn calculate_dy_dt(&self, t: T, y: &S, dy_dt: &mut S);
}

pub struct IVPBuilder<C> {
    component: Arc<C>,
    pub y0: ModelState,
}

impl<C> System<Time, ModelState> for IVPBuilder<C>
where
    C: IVP<Time, ModelState>,
{
    fn system(&self, t: Time, y: &ModelState, dy: &mut ModelState) {
        self.component.calculate_dy_dt(t, y, dy)
    }
}

impl<C> IVPBuilder<C>
where
    C: IVP<Time, ModelState>,
{
    pub fn new(component: Arc<C>, y0: ModelState) -> Self {
        Self { component, y0 }
    }

    /// Fixed-step fourth order Runge-Kutta from `t0` to `t1`.
    pub fn to_rk4(self, t0: Time, t1: Time, step: Time) -> Rk4<Time, ModelState, Self> {
        let y0 = self.y0.clone();
        Rk4::new(self, t0, y0, t1, step)
    }
}

/// The state at the final solver step, checked to be at `t_expected`.
pub fn get_last_step<S>(results: &SolverResult<Time, S>, t_expected: Time) -> C14Result<&S> {
    let (times, states) = results.get();
    match (times.last(), states.last()) {
        (Some(&t_last), Some(state)) if is_close!(t_last, t_expected) => Ok(state),
        (Some(&t_last), Some(_)) => Err(C14Error::Integration(format!(
            "solver stopped at t = {t_last}, expected t = {t_expected}"
        ))),
        _ => Err(C14Error::Integration("solver produced no steps".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    /// dy/dt = -k y
    struct Decay {
        k: FloatValue,
    }

    impl IVP<Time, ModelState> for Decay {
        fn calculate_dy_dt(&self, _t: Time, y: &ModelState, dy_dt: &mut ModelState) {
            dy_dt[0] = -self.k * y[0];
            dy_dt[1] = self.k * y[0];
        }
    }

    #[test]
    fn exponential_decay() {
        let builder = IVPBuilder::new(Arc::new(Decay { k: 0.5 }), dvector![1.0, 0.0]);
        let mut solver = builder.to_rk4(0.0, 2.0, 0.01);
        solver.integrate().unwrap();

        let y = get_last_step(solver.results(), 2.0).unwrap();
        assert_relative_eq!(y[0], (-1.0f64).exp(), max_relative = 1e-8);
        // the second component accumulates what left the first
        assert_relative_eq!(y[0] + y[1], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn wrong_end_time() {
        let builder = IVPBuilder::new(Arc::new(Decay { k: 0.5 }), dvector![1.0, 0.0]);
        let mut solver = builder.to_rk4(0.0, 1.0, 0.25);
        solver.integrate().unwrap();
        assert!(matches!(
            get_last_step(solver.results(), 3.0),
            Err(C14Error::Integration(_))
        ));
    }
}
