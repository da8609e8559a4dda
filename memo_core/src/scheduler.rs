//! SM-2 scheduling engine.
//!
//! A pure update rule from `(grade, current state)` to the next state:
//! - Failing grades (< 3) reset the streak and re-show the card almost at once
//! - Passing grades grow the interval 1 → 6 → `round(interval * ease_factor)`
//! - The ease factor moves with the grade and never drops below 1.3
//!
//! No clock is read here. Callers turn the returned interval into an absolute
//! time with [`MemoryState::scheduled`](crate::MemoryState::scheduled).

use crate::{Grade, SchedulingState};

/// Lowest ease factor a card may have
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Interval in days given to a card after a failing grade (about 8.6 seconds)
pub const LAPSE_INTERVAL: f64 = 0.0001;

const FIRST_INTERVAL: f64 = 1.0;
const SECOND_INTERVAL: f64 = 6.0;

/// Compute the next scheduling state for a card
///
/// ## Update rule
///
/// 1. **Failure** (`grade < 3`): repetition 0, interval 0.0001, ease factor unchanged
/// 2. **Success**: repetition + 1, then
///    - repetition 1 → interval 1
///    - repetition 2 → interval 6
///    - otherwise → `round(interval * ease_factor)` using the *current* values
/// 3. Ease factor on success:
///    `ef + (0.1 - (5 - g) * (0.08 + (5 - g) * 0.02))`, clamped at 1.3
pub fn compute_next_state(grade: Grade, current: SchedulingState) -> SchedulingState {
    if !grade.is_passing() {
        return SchedulingState {
            repetition: 0,
            interval: LAPSE_INTERVAL,
            ease_factor: current.ease_factor,
        };
    }

    let repetition = current.repetition + 1;
    let interval = match repetition {
        1 => FIRST_INTERVAL,
        2 => SECOND_INTERVAL,
        _ => (current.interval * current.ease_factor).round(),
    };

    SchedulingState {
        repetition,
        interval,
        ease_factor: next_ease_factor(current.ease_factor, grade),
    }
}

fn next_ease_factor(ease_factor: f64, grade: Grade) -> f64 {
    let q = (Grade::MAX - grade.value()) as f64;
    let next = ease_factor + (0.1 - q * (0.08 + q * 0.02));
    if next < MIN_EASE_FACTOR {
        MIN_EASE_FACTOR
    } else {
        next
    }
}
