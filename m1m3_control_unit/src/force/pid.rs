//! Balance PID: backward-Euler integral, first-order filtered derivative
//! and optional back-calculation anti-windup.
//!
//! One [`Pid`] runs per mirror force axis (fx, fy, fz, mx, my, mz). Its
//! input is the load the hardpoints see; its output is the force the
//! actuators must add to take that load off the hardpoints.

use m1m3_common::settings::PidParameters;

/// Integrator and derivative memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    integral: f64,
    prev_error: f64,
    derivative_filtered: f64,
    prev_raw_output: f64,
}

impl PidState {
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

/// Continuous-form gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (0 = disabled).
    pub ki: f64,
    /// Derivative gain (0 = disabled).
    pub kd: f64,
    /// Derivative filter time constant [s] (0 = unfiltered).
    pub tf: f64,
    /// Anti-windup tracking time constant [s] (0 = disabled).
    pub tt: f64,
    /// Output saturation used by anti-windup [N].
    pub out_max: f64,
}

impl PidGains {
    /// Gains from a settings entry. `n` is the derivative filter bandwidth,
    /// so `tf = 1/n`; anti-windup stays off.
    pub fn from_parameters(p: &PidParameters) -> Self {
        Self {
            kp: p.p,
            ki: p.i,
            kd: p.d,
            tf: if p.n > 0.0 { 1.0 / p.n } else { 0.0 },
            tt: 0.0,
            out_max: 0.0,
        }
    }
}

/// One PID cycle. Returns the unsaturated output.
#[inline]
pub fn pid_compute(state: &mut PidState, gains: &PidGains, error: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }

    let p_term = gains.kp * error;

    let i_term = if gains.ki != 0.0 {
        let anti_windup = if gains.tt > 0.0 && gains.out_max > 0.0 {
            let saturated = state.prev_raw_output.clamp(-gains.out_max, gains.out_max);
            (saturated - state.prev_raw_output) / gains.tt
        } else {
            0.0
        };
        state.integral += (gains.ki * error + anti_windup) * dt;
        state.integral
    } else {
        state.integral = 0.0;
        0.0
    };

    let d_term = if gains.kd != 0.0 {
        let raw_derivative = (error - state.prev_error) / dt;
        if gains.tf > 0.0 {
            let alpha = dt / (gains.tf + dt);
            state.derivative_filtered += alpha * (raw_derivative - state.derivative_filtered);
            gains.kd * state.derivative_filtered
        } else {
            gains.kd * raw_derivative
        }
    } else {
        state.derivative_filtered = 0.0;
        0.0
    };

    state.prev_error = error;
    let raw_output = p_term + i_term + d_term;
    state.prev_raw_output = raw_output;
    raw_output
}

/// A PID with its own parameters and timestep.
#[derive(Debug, Clone)]
pub struct Pid {
    parameters: PidParameters,
    gains: PidGains,
    state: PidState,
}

impl Pid {
    pub fn new(parameters: PidParameters) -> Self {
        Self {
            gains: PidGains::from_parameters(&parameters),
            parameters,
            state: PidState::default(),
        }
    }

    #[inline]
    pub fn parameters(&self) -> &PidParameters {
        &self.parameters
    }

    #[inline]
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Replace the gains; the state is kept.
    pub fn set_parameters(&mut self, parameters: PidParameters) {
        self.gains = PidGains::from_parameters(&parameters);
        self.parameters = parameters;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Advance one timestep toward zero error.
    pub fn process(&mut self, error: f64) -> f64 {
        pid_compute(&mut self.state, &self.gains, error, self.parameters.timestep)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.02;

    fn gains(kp: f64, ki: f64, kd: f64, tf: f64) -> PidGains {
        PidGains {
            kp,
            ki,
            kd,
            tf,
            tt: 0.0,
            out_max: 0.0,
        }
    }

    #[test]
    fn pure_proportional() {
        let mut s = PidState::default();
        let out = pid_compute(&mut s, &gains(2.5, 0.0, 0.0, 0.0), 4.0, DT);
        assert!((out - 10.0).abs() < 1e-12);
    }

    #[test]
    fn integral_accumulates() {
        let mut s = PidState::default();
        let g = gains(0.0, 10.0, 0.0, 0.0);
        for _ in 0..5 {
            pid_compute(&mut s, &g, 1.0, DT);
        }
        // 10 * 1.0 * 0.02 * 5
        assert!((s.integral() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn filtered_derivative_is_smaller_than_raw() {
        let mut raw = PidState::default();
        let mut filtered = PidState::default();
        pid_compute(&mut raw, &gains(0.0, 0.0, 1.0, 0.0), 0.0, DT);
        pid_compute(&mut filtered, &gains(0.0, 0.0, 1.0, 0.1), 0.0, DT);
        let r = pid_compute(&mut raw, &gains(0.0, 0.0, 1.0, 0.0), 1.0, DT);
        let f = pid_compute(&mut filtered, &gains(0.0, 0.0, 1.0, 0.1), 1.0, DT);
        assert!((r - 50.0).abs() < 1e-9);
        let alpha = DT / (0.1 + DT);
        assert!((f - alpha * 50.0).abs() < 1e-9);
    }

    #[test]
    fn anti_windup_bounds_integral() {
        let mut s = PidState::default();
        let g = PidGains {
            kp: 1.0,
            ki: 100.0,
            kd: 0.0,
            tf: 0.0,
            tt: 0.05,
            out_max: 10.0,
        };
        for _ in 0..5000 {
            pid_compute(&mut s, &g, 100.0, DT);
        }
        assert!(s.integral().abs() < 1_000_000.0);
    }

    #[test]
    fn parameters_map_filter_bandwidth() {
        let p = PidParameters {
            timestep: 0.02,
            p: 1.0,
            i: 0.5,
            d: 0.1,
            n: 20.0,
        };
        let g = PidGains::from_parameters(&p);
        assert_eq!(g.kp, 1.0);
        assert_eq!(g.ki, 0.5);
        assert_eq!(g.kd, 0.1);
        assert!((g.tf - 0.05).abs() < 1e-12);
        assert_eq!(PidGains::from_parameters(&PidParameters { n: 0.0, ..p }).tf, 0.0);
    }

    #[test]
    fn pid_reset_and_set_parameters() {
        let mut pid = Pid::new(PidParameters::default());
        for _ in 0..10 {
            pid.process(100.0);
        }
        assert!(pid.state().integral() > 0.0);
        let integral = pid.state().integral();
        pid.set_parameters(PidParameters {
            p: 2.0,
            ..PidParameters::default()
        });
        assert_eq!(pid.state().integral(), integral);
        assert_eq!(pid.parameters().p, 2.0);
        pid.reset();
        assert_eq!(pid.state(), &PidState::default());
    }
}
