// THEORY:
// Contour extraction turns the cleaned mask into a list of candidate objects.
// Each candidate is one 8-connected group of set pixels, described by the
// closed polygon that runs through the centres of its outermost pixels.
//
// Only *external* regions are reported. A region sitting inside a hole of
// another region (a sticker on the target, say) is part of that target's
// silhouette, not a separate object. A region is external when it touches the
// frame edge or borders the background that is reachable from the frame edge.
// Background connectivity is 4-way, the dual of the 8-way foreground, so a
// diagonal gap in a ring does not let the outside leak into the hole.
//
// Regions come out in raster order of their top-left-most pixel. That order is
// the tie-break downstream when two regions have the same area.

use crate::core_modules::mask::Mask;

/// Clockwise on screen (y grows downward): W, NW, N, NE, E, SE, S, SW.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

const FOUR_NEIGHBOURS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// The outer boundary of one connected region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    /// Boundary pixels in tracing order. Pixels on one-pixel-wide parts of the
    /// region appear once for each side they are passed on.
    pub points: Vec<(i32, i32)>,
    /// Number of set pixels in the region.
    pub pixel_count: usize,
}

impl Contour {
    /// Area enclosed by the boundary polygon (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let (x0, y0) = self.points[i];
                let (x1, y1) = self.points[(i + 1) % n];
                x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }
}

/// Finds the outer boundary of every external region in `mask`.
pub fn external_contours(mask: &Mask) -> Vec<Contour> {
    let width = mask.width() as i64;
    let height = mask.height() as i64;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let outside = outside_background(mask);
    let index = |x: i64, y: i64| (y * width + x) as usize;

    let mut visited = vec![false; (width * height) as usize];
    let mut contours = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if !mask.get(x, y) || visited[index(x, y)] {
                continue;
            }

            // --- Flood the region and check whether it is exposed to the outside ---
            let mut stack = vec![(x, y)];
            visited[index(x, y)] = true;
            let mut pixel_count = 0;
            let mut external = false;

            while let Some((cx, cy)) = stack.pop() {
                pixel_count += 1;
                if cx == 0 || cy == 0 || cx == width - 1 || cy == height - 1 {
                    external = true;
                }
                if !external {
                    external = FOUR_NEIGHBOURS.iter().any(|(dx, dy)| {
                        let (nx, ny) = (cx + dx, cy + dy);
                        !mask.get(nx, ny) && outside[index(nx, ny)]
                    });
                }
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if mask.get(nx, ny) && !visited[index(nx, ny)] {
                        visited[index(nx, ny)] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            if external {
                contours.push(Contour {
                    points: trace_boundary(mask, (x, y)),
                    pixel_count,
                });
            }
        }
    }

    contours
}

/// Marks the background pixels reachable from the frame edge with 4-way steps.
fn outside_background(mask: &Mask) -> Vec<bool> {
    let width = mask.width() as i64;
    let height = mask.height() as i64;
    let index = |x: i64, y: i64| (y * width + x) as usize;

    let mut outside = vec![false; (width * height) as usize];
    let mut stack = Vec::new();

    let edge = (0..width)
        .flat_map(|x| [(x, 0), (x, height - 1)])
        .chain((0..height).flat_map(|y| [(0, y), (width - 1, y)]));
    for (x, y) in edge {
        if !mask.get(x, y) && !outside[index(x, y)] {
            outside[index(x, y)] = true;
            stack.push((x, y));
        }
    }

    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in FOUR_NEIGHBOURS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            if !mask.get(nx, ny) && !outside[index(nx, ny)] {
                outside[index(nx, ny)] = true;
                stack.push((nx, ny));
            }
        }
    }

    outside
}

/// Moore-neighbour boundary following from the region's top-left-most pixel.
fn trace_boundary(mask: &Mask, start: (i64, i64)) -> Vec<(i32, i32)> {
    let to_point = |(x, y): (i64, i64)| (x as i32, y as i32);

    // Everything west of and above `start` is background, so the scan can begin at W.
    let Some((first, first_dir)) = next_on_boundary(mask, start, 0) else {
        return vec![to_point(start)];
    };

    let mut points = vec![to_point(start)];
    let mut current = first;
    let mut dir = first_dir;

    loop {
        // Resume the scan at the last background pixel seen before `current`.
        let from = if dir % 2 == 0 {
            (dir + 6) % 8
        } else {
            (dir + 5) % 8
        };
        let Some((next, next_dir)) = next_on_boundary(mask, current, from) else {
            break;
        };
        if current == start && next == first {
            break;
        }
        points.push(to_point(current));
        current = next;
        dir = next_dir;
    }

    points
}

fn next_on_boundary(mask: &Mask, (x, y): (i64, i64), from: usize) -> Option<((i64, i64), usize)> {
    (0..8).map(|k| (from + k) % 8).find_map(|dir| {
        let (dx, dy) = NEIGHBOURS[dir];
        let (cx, cy) = (x + dx, y + dy);
        mask.get(cx, cy).then_some(((cx, cy), dir))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut Mask, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
    }

    #[test]
    fn filled_rectangle_has_center_to_center_area() {
        let mut mask = Mask::new(30, 30);
        fill(&mut mask, 5, 5, 10, 6);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].pixel_count, 60);
        assert_eq!(contours[0].area(), 45.0);
    }

    #[test]
    fn boundary_walks_the_corners_of_a_small_square() {
        let mut mask = Mask::new(5, 5);
        fill(&mut mask, 1, 1, 2, 2);
        let contours = external_contours(&mask);
        assert_eq!(contours[0].points, vec![(1, 1), (2, 1), (2, 2), (1, 2)]);
        assert_eq!(contours[0].area(), 1.0);
    }

    #[test]
    fn thin_line_has_zero_area() {
        let mut mask = Mask::new(10, 3);
        fill(&mut mask, 2, 1, 5, 1);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 0.0);
    }

    #[test]
    fn single_pixel_region() {
        let mut mask = Mask::new(3, 3);
        mask.set(1, 1, true);
        let contours = external_contours(&mask);
        assert_eq!(contours[0].points, vec![(1, 1)]);
        assert_eq!(contours[0].area(), 0.0);
    }

    #[test]
    fn diagonal_pixels_are_one_region() {
        let mut mask = Mask::new(6, 6);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        mask.set(3, 3, true);
        assert_eq!(external_contours(&mask).len(), 1);
    }

    #[test]
    fn regions_are_reported_in_raster_order() {
        let mut mask = Mask::new(40, 20);
        fill(&mut mask, 25, 2, 4, 4);
        fill(&mut mask, 3, 8, 6, 6);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].points[0], (25, 2));
        assert_eq!(contours[1].points[0], (3, 8));
    }

    #[test]
    fn island_inside_a_hole_is_not_external() {
        let mut mask = Mask::new(20, 20);
        fill(&mut mask, 2, 2, 15, 15);
        // Punch a hole and put an island in it.
        for y in 5..14 {
            for x in 5..14 {
                mask.set(x, y, false);
            }
        }
        fill(&mut mask, 8, 8, 3, 3);

        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        // The ring's outer boundary encloses the hole too.
        assert_eq!(contours[0].area(), 196.0);
    }

    #[test]
    fn region_touching_the_edge_is_external() {
        let mut mask = Mask::new(10, 10);
        fill(&mut mask, 0, 0, 3, 3);
        let contours = external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 4.0);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(external_contours(&Mask::new(8, 8)).is_empty());
        assert!(external_contours(&Mask::new(0, 0)).is_empty());
    }
}
