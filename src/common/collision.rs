use super::TimedState;

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Position and velocity of an agent executing `from -> to`, evaluated at `t` seconds.
fn kinematics<S: TimedState>(from: &S, to: &S, t: f64) -> (Vec3, Vec3) {
    let start = from.coords();
    let duration = to.seconds() - from.seconds();
    if duration <= f64::EPSILON {
        return (start, [0.0; 3]);
    }
    let velocity = scale(sub(to.coords(), start), 1.0 / duration);
    let elapsed = t - from.seconds();
    (
        [
            start[0] + velocity[0] * elapsed,
            start[1] + velocity[1] * elapsed,
            start[2] + velocity[2] * elapsed,
        ],
        velocity,
    )
}

/// Time interval (seconds) during which two constant-velocity transitions are
/// closer than the sum of their radii.
pub fn collision_interval_3d<S: TimedState>(
    a1: &S,
    a2: &S,
    b1: &S,
    b2: &S,
    radius_a: f64,
    radius_b: f64,
) -> Option<(f64, f64)> {
    let window_start = a1.seconds().max(b1.seconds());
    let window_end = a2.seconds().min(b2.seconds());
    if window_start > window_end {
        return None;
    }

    let (pa, va) = kinematics(a1, a2, window_start);
    let (pb, vb) = kinematics(b1, b2, window_start);
    let d0 = sub(pa, pb);
    let dv = sub(va, vb);
    let reach = radius_a + radius_b;

    // |d0 + dv * s|^2 < reach^2, s in [0, window_end - window_start]
    let qa = dot(dv, dv);
    let qb = 2.0 * dot(d0, dv);
    let qc = dot(d0, d0) - reach * reach;
    let span = window_end - window_start;

    if qa <= f64::EPSILON {
        return (qc < 0.0).then_some((window_start, window_end));
    }

    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant <= 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let enter = ((-qb - root) / (2.0 * qa)).max(0.0);
    let leave = ((-qb + root) / (2.0 * qa)).min(span);
    if enter < leave || (qc < 0.0 && span <= f64::EPSILON) {
        Some((window_start + enter, window_start + leave.max(enter)))
    } else {
        None
    }
}

/// First time of contact (seconds) between two transitions, if any.
pub fn collision_check_3d<S: TimedState>(a1: &S, a2: &S, b1: &S, b2: &S, radius: f64) -> Option<f64> {
    collision_interval_3d(a1, a2, b1, b2, radius, radius).map(|(enter, _)| enter)
}

fn orientation(p: [f64; 2], q: [f64; 2], r: [f64; 2]) -> f64 {
    (q[0] - p[0]) * (r[1] - p[1]) - (q[1] - p[1]) * (r[0] - p[0])
}

fn on_segment(p: [f64; 2], q: [f64; 2], r: [f64; 2]) -> bool {
    r[0] >= p[0].min(q[0]) && r[0] <= p[0].max(q[0]) && r[1] >= p[1].min(q[1]) && r[1] <= p[1].max(q[1])
}

/// 2-D segment intersection, collinear overlap included.
pub fn segments_intersect(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Planar axis-aligned bounds of a set of states, padded by `pad`.
pub fn planar_bounds<'a, S: TimedState + 'a>(
    states: impl IntoIterator<Item = &'a S>,
    pad: f64,
) -> Option<([f64; 2], [f64; 2])> {
    states.into_iter().fold(None, |acc, state| {
        let c = state.coords();
        Some(match acc {
            None => ([c[0] - pad, c[1] - pad], [c[0] + pad, c[1] + pad]),
            Some((lo, hi)) => (
                [lo[0].min(c[0] - pad), lo[1].min(c[1] - pad)],
                [hi[0].max(c[0] + pad), hi[1].max(c[1] + pad)],
            ),
        })
    })
}

pub fn bounds_overlap(a: ([f64; 2], [f64; 2]), b: ([f64; 2], [f64; 2])) -> bool {
    a.0[0] <= b.1[0] && b.0[0] <= a.1[0] && a.0[1] <= b.1[1] && b.0[1] <= a.1[1]
}
