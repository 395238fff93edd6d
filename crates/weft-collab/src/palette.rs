//! Presence colour assignment.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

/// Colours handed to editors as they join. Chosen for contrast on the canvas.
pub const PRESENCE_PALETTE: &[&str] = &[
    "#e06c75", "#61afef", "#98c379", "#e5c07b", "#c678dd", "#56b6c2", "#d19a66", "#f07178",
    "#82aaff", "#c3e88d", "#ffcb6b", "#f78c6c",
];

/// Pick a colour for a newly joined user.
///
/// Uses the OS CSPRNG so a client cannot predict or force assignments.
pub(crate) fn pick_colour() -> &'static str {
    PRESENCE_PALETTE
        .choose(&mut OsRng)
        .copied()
        .unwrap_or(PRESENCE_PALETTE[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_colour_is_from_the_palette() {
        for _ in 0..32 {
            assert!(PRESENCE_PALETTE.contains(&pick_colour()));
        }
    }
}
