//! Agent actions and random course generation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete actions of a cooking-environment agent, by wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Right = 0,
    Down = 1,
    Left = 2,
    Up = 3,
    Stay = 4,
    Interact = 5,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Right,
        Action::Down,
        Action::Left,
        Action::Up,
        Action::Stay,
        Action::Interact,
    ];

    /// Number of distinct actions a course may contain.
    pub const COUNT: u8 = 6;

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Right => "right",
            Action::Down => "down",
            Action::Left => "left",
            Action::Up => "up",
            Action::Stay => "stay",
            Action::Interact => "interact",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unknown action code: {0}")]
    UnknownCode(u8),
}

impl TryFrom<u8> for Action {
    type Error = ActionError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Action::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(ActionError::UnknownCode(code))
    }
}

/// Two independent `n`-long action sequences drawn uniformly from `0..=5`.
pub fn generate_random_actions(n: usize) -> (Vec<u8>, Vec<u8>) {
    generate_with(&mut rand::thread_rng(), n)
}

/// [`generate_random_actions`] with a caller-supplied RNG.
pub fn generate_with<R: Rng>(rng: &mut R, n: usize) -> (Vec<u8>, Vec<u8>) {
    let actions_1 = (0..n).map(|_| rng.gen_range(0..Action::COUNT)).collect();
    let actions_2 = (0..n).map(|_| rng.gen_range(0..Action::COUNT)).collect();
    (actions_1, actions_2)
}
