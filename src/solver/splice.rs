use crate::algorithm::SingleAgentPlanner;
use crate::common::{Path, TimedState};
use crate::environment::Environment;

/// Waypoints an agent's path must visit in order: the start, every
/// transition required by a positive constraint (sorted by time), then the
/// remaining user waypoints.
pub(super) fn leg_points<S: TimedState>(waypoints: &[S], env: &dyn Environment<S>) -> Vec<S> {
    let mut required: Vec<S> = env
        .constraints()
        .positive()
        .iter()
        .flat_map(|c| {
            let (from, to) = c.required_transition();
            [from.clone(), to.clone()]
        })
        .collect();
    required.sort_by_key(TimedState::time);
    required.dedup();

    let mut points = Vec::with_capacity(waypoints.len() + required.len());
    points.extend(waypoints.first().cloned());
    for state in required {
        if points.last() != Some(&state) {
            points.push(state);
        }
    }
    points.extend(waypoints.iter().skip(1).cloned());
    points
}

/// Plan through every point, returning the path and the index each point
/// was reached at.
pub(super) fn full_path<S: TimedState>(
    planner: &mut dyn SingleAgentPlanner<S>,
    env: &dyn Environment<S>,
    points: &[S],
    min_finish_time: u32,
) -> Option<(Path<S>, Vec<usize>)> {
    let first = points.first()?.clone();
    let mut path = vec![first];
    let mut wpts = vec![0];
    for (g, goal) in points.iter().enumerate().skip(1) {
        let min_time = if g + 1 == points.len() {
            min_finish_time
        } else {
            goal.time()
        };
        let start = path.last()?.clone();
        let leg = planner.plan(env, &start, goal, min_time)?;
        path.extend(leg.into_iter().skip(1));
        wpts.push(path.len() - 1);
    }
    Some((path, wpts))
}

/// Re-plan the leg between waypoints `s` and `s + 1` of an existing path.
pub(super) fn replan_leg<S: TimedState>(
    planner: &mut dyn SingleAgentPlanner<S>,
    env: &dyn Environment<S>,
    path: &[S],
    wpts: &[usize],
    points: &[S],
    s: usize,
    min_finish_time: u32,
) -> Option<Path<S>> {
    let start = path.get(*wpts.get(s)?)?.clone();
    let goal = points.get(s + 1)?;
    planner.plan(env, &start, goal, min_finish_time)
}

/// Minimum finish time for a leg ending at waypoint `g`.
pub(super) fn leg_min_time<S: TimedState>(points: &[S], g: usize, min_finish_time: u32) -> u32 {
    if g + 1 >= points.len() {
        min_finish_time
    } else {
        points[g].time()
    }
}

/// Replace the states between waypoints `s` and `g` with `leg`, shifting the
/// remainder of the path in time so it stays continuous.
pub(super) fn merge_leg<S: TimedState>(
    leg: &[S],
    path: &[S],
    wpts: &mut [usize],
    s: usize,
    g: usize,
) -> Path<S> {
    let (Some(first), Some(last)) = (leg.first(), leg.last()) else {
        return path.to_vec();
    };
    let begin = wpts[s];
    let mut end = wpts[g].min(path.len() - 1);
    // Waiting at the waypoint belongs to the leg being replaced.
    while end + 1 < path.len() && path[end + 1].same_loc(&path[end]) {
        end += 1;
    }
    debug_assert!(first.same_loc(&path[begin]));

    let shift = last.time() as i64 - path[end].time() as i64;
    let mut merged = Vec::with_capacity(path.len() + leg.len());
    merged.extend_from_slice(&path[..begin]);
    merged.extend_from_slice(leg);
    merged.extend(path[end + 1..].iter().map(|state| {
        let t = (state.time() as i64 + shift).max(0) as u32;
        state.with_time(t)
    }));

    let old_len = end - begin + 1;
    for w in wpts.iter_mut().skip(g + 1) {
        *w = *w + leg.len() - old_len;
    }
    let mut arrival = begin + leg.len() - 1;
    while arrival > begin + 1 && merged[arrival - 1].same_loc(&merged[arrival]) {
        arrival -= 1;
    }
    wpts[g] = arrival;
    merged
}
