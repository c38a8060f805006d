use crate::common::{collision_check_3d, Path, TimedState};

fn transitions<S: TimedState>(path: &[S], park_until: Option<u32>) -> Vec<(S, S)> {
    let mut moves: Vec<(S, S)> = path
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect();
    if let (Some(until), Some(last)) = (park_until, path.last()) {
        if until > last.time() || path.len() == 1 {
            moves.push((last.clone(), last.with_time(until.max(last.time()))));
        }
    }
    moves
}

/// First pair of agents whose paths collide, with the contact time in
/// seconds. Checks every time-overlapping pair of transitions, independent
/// of the search's own detection.
pub fn find_collision<S: TimedState>(
    paths: &[Path<S>],
    radius: f64,
    disappear_at_goal: bool,
) -> Option<(usize, usize, f64)> {
    let until = paths
        .iter()
        .filter_map(|p| p.last().map(TimedState::time))
        .max()?;
    let park = (!disappear_at_goal).then_some(until);
    let moves: Vec<Vec<(S, S)>> = paths.iter().map(|p| transitions(p, park)).collect();

    for (i, a) in moves.iter().enumerate() {
        for (j, b) in moves.iter().enumerate().skip(i + 1) {
            for (a1, a2) in a {
                for (b1, b2) in b {
                    if a1.time() >= b2.time() || b1.time() >= a2.time() {
                        continue;
                    }
                    if let Some(at) = collision_check_3d(a1, a2, b1, b2, radius) {
                        return Some((i, j, at));
                    }
                }
            }
        }
    }
    None
}
