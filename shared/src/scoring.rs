//! Round scoring
//!
//! A correct answer earns a fixed base, a speed bonus proportional to the
//! time left when the answer was given, and a bonus for the streak held
//! before this round. Anything else earns nothing and breaks the streak.

pub const BASE_POINTS: u64 = 1000;
pub const MAX_SPEED_BONUS: u64 = 500;
pub const STREAK_BONUS: u64 = 100;

/// Points for a correct answer:
/// `1000 + ceil(time_left / total_time * 500) + streak * 100`
pub fn calculate_points(time_left: u32, total_time: u32, streak: u32) -> u64 {
    let speed_bonus = if total_time == 0 {
        0
    } else {
        let time_left = time_left.min(total_time) as u64;
        let total_time = total_time as u64;
        (time_left * MAX_SPEED_BONUS).div_ceil(total_time)
    };

    BASE_POINTS + speed_bonus + streak as u64 * STREAK_BONUS
}

/// Share of the round still left, in `0.0..=1.0`
pub fn time_fraction(time_left: u32, total_time: u32) -> f32 {
    if total_time == 0 {
        return 0.0;
    }
    time_left.min(total_time) as f32 / total_time as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub correct: bool,
    pub points: u64,
    /// Streak after this round
    pub streak: u32,
}

/// Scores one player's round.
///
/// `answer` is `None` when nothing arrived before the round ended; a
/// negative index is an explicit skip or client-side timeout.
pub fn score_answer(
    answer: Option<i32>,
    correct_index: u8,
    time_left: u32,
    total_time: u32,
    streak: u32,
) -> RoundOutcome {
    let correct = answer == Some(correct_index as i32);

    if correct {
        RoundOutcome {
            correct,
            points: calculate_points(time_left, total_time, streak),
            streak: streak + 1,
        }
    } else {
        RoundOutcome {
            correct,
            points: 0,
            streak: 0,
        }
    }
}
