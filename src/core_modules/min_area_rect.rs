// THEORY:
// The tracked object's position is the centre of the smallest rectangle, at any
// rotation, that encloses its outline. Compared to an axis-aligned box this
// stays centred on the object when the target is seen at an angle.
//
// 1.  **Convex hull** (monotone chain): only hull vertices can touch the
//     minimal rectangle.
// 2.  **Rotating calipers**: one side of the minimal rectangle is collinear with
//     a hull edge, so it is enough to try the orientation of every hull edge and
//     keep the smallest box.

/// A rectangle with arbitrary rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    /// Centre in pixel coordinates.
    pub center: (f32, f32),
    /// Extent along the rectangle's own axes: (along `angle`, perpendicular to it).
    pub size: (f32, f32),
    /// Rotation of the first axis, in degrees, measured from +x toward +y.
    pub angle: f32,
}

impl RotatedRect {
    pub fn area(&self) -> f32 {
        self.size.0 * self.size.1
    }

    /// The four corners, in order around the rectangle.
    pub fn corners(&self) -> [(f32, f32); 4] {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let (hw, hh) = (self.size.0 / 2.0, self.size.1 / 2.0);
        let (cx, cy) = self.center;
        let corner = |a: f32, b: f32| (cx + a * cos - b * sin, cy + a * sin + b * cos);
        [
            corner(-hw, -hh),
            corner(hw, -hh),
            corner(hw, hh),
            corner(-hw, hh),
        ]
    }
}

fn cross(o: (i64, i64), a: (i64, i64), b: (i64, i64)) -> i64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull of a point set, without collinear vertices.
pub fn convex_hull(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let mut sorted: Vec<(i64, i64)> = points.iter().map(|&(x, y)| (x as i64, y as i64)).collect();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted
            .into_iter()
            .map(|(x, y)| (x as i32, y as i32))
            .collect();
    }

    let mut hull: Vec<(i64, i64)> = Vec::with_capacity(sorted.len() * 2);
    // Lower chain.
    for &p in &sorted {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    // Upper chain.
    let lower_len = hull.len() + 1;
    for &p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();

    hull.into_iter()
        .map(|(x, y)| (x as i32, y as i32))
        .collect()
}

/// Minimum-area enclosing rectangle of a point set. `None` for an empty set.
pub fn min_area_rect(points: &[(i32, i32)]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return None,
        1 => {
            let (x, y) = hull[0];
            return Some(RotatedRect {
                center: (x as f32, y as f32),
                size: (0.0, 0.0),
                angle: 0.0,
            });
        }
        _ => {}
    }

    let pts: Vec<(f64, f64)> = hull.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    let mut best: Option<(f64, RotatedRect)> = None;

    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        let (ex, ey) = (b.0 - a.0, b.1 - a.1);
        let length = (ex * ex + ey * ey).sqrt();
        if length == 0.0 {
            continue;
        }
        let u = (ex / length, ey / length);
        let v = (-u.1, u.0);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(px, py) in &pts {
            let pu = px * u.0 + py * u.1;
            let pv = px * v.0 + py * v.1;
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.is_some_and(|(best_area, _)| area >= best_area) {
            continue;
        }

        let mid_u = (min_u + max_u) / 2.0;
        let mid_v = (min_v + max_v) / 2.0;
        let rect = RotatedRect {
            center: (
                (mid_u * u.0 + mid_v * v.0) as f32,
                (mid_u * u.1 + mid_v * v.1) as f32,
            ),
            size: ((max_u - min_u) as f32, (max_v - min_v) as f32),
            angle: u.1.atan2(u.0).to_degrees() as f32,
        };
        best = Some((area, rect));
    }

    best.map(|(_, rect)| rect)
}
