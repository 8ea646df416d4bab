//! # Shape descriptors
//!
//! Measurements of a connected component used to tell blobs from noise: pixel moments, border
//! length, convex hull and minimal enclosing circle.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use imageproc::geometry::convex_hull;
use imageproc::point::Point;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

// Chain code length weights (Vossepoel and Smeulders) for axial steps, diagonal steps and
// direction changes.
const AXIAL_STEP: f64 = 0.980;
const DIAGONAL_STEP: f64 = 1.406;
const CORNER: f64 = 0.091;

const EPS: f64 = 1e-9;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Running sums of pixel coordinates up to second order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Moments {
    n: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Moments {
    #[inline]
    pub fn push(&mut self, x: u32, y: u32) {
        let (x, y) = (x as f64, y as f64);
        self.n += 1.0;
        self.sx += x;
        self.sy += y;
        self.sxx += x * x;
        self.syy += y * y;
        self.sxy += x * y;
    }

    /// Pixel count.
    pub fn area(&self) -> f64 {
        self.n
    }

    pub fn centroid(&self) -> (f64, f64) {
        if self.n == 0.0 {
            return (0.0, 0.0);
        }
        (self.sx / self.n, self.sy / self.n)
    }

    /// Ratio of the minor to the major principal second moment.
    ///
    /// 1 for rotationally symmetric regions, tending to 0 for lines.
    pub fn inertia_ratio(&self) -> f64 {
        if self.n == 0.0 {
            return 0.0;
        }

        let (cx, cy) = self.centroid();
        let mu20 = self.sxx / self.n - cx * cx;
        let mu02 = self.syy / self.n - cy * cy;
        let mu11 = self.sxy / self.n - cx * cy;

        let spread = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
        let major = 0.5 * (mu20 + mu02 + spread);
        let minor = 0.5 * (mu20 + mu02 - spread);

        if major <= EPS {
            return 1.0;
        }

        (minor / major).clamp(0.0, 1.0)
    }
}

impl Circle {
    fn through2(a: (f64, f64), b: (f64, f64)) -> Self {
        let x = 0.5 * (a.0 + b.0);
        let y = 0.5 * (a.1 + b.1);
        Self {
            x,
            y,
            radius: dist(a, (x, y)),
        }
    }

    fn through3(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));

        // Collinear, so the widest pair spans the circle
        if d.abs() < EPS {
            return [Self::through2(a, b), Self::through2(a, c), Self::through2(b, c)]
                .into_iter()
                .fold(Self::through2(a, b), |best, c| {
                    if c.radius > best.radius {
                        c
                    } else {
                        best
                    }
                });
        }

        let a2 = a.0 * a.0 + a.1 * a.1;
        let b2 = b.0 * b.0 + b.1 * b.1;
        let c2 = c.0 * c.0 + c.1 * c.1;
        let x = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let y = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;

        Self {
            x,
            y,
            radius: dist(a, (x, y)),
        }
    }

    fn contains(&self, p: (f64, f64)) -> bool {
        dist(p, (self.x, self.y)) <= self.radius + 1e-7
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Sorted copy of `points` with repeats removed.
fn unique_points<I>(points: I) -> Vec<Point<i32>>
where
    I: IntoIterator<Item = Point<i32>>,
{
    let mut xy: Vec<(i32, i32)> = points.into_iter().map(|p| (p.x, p.y)).collect();
    xy.sort_unstable();
    xy.dedup();
    xy.into_iter().map(|(x, y)| Point::new(x, y)).collect()
}

#[inline]
fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Length of a closed 8-connected border, corrected for the bias of counting pixel steps.
pub fn border_length(border: &[Point<i32>]) -> f64 {
    if border.len() < 2 {
        return 0.0;
    }

    let steps: Vec<(i32, i32)> = border
        .iter()
        .zip(border.iter().cycle().skip(1))
        .map(|(a, b)| (b.x - a.x, b.y - a.y))
        .filter(|&s| s != (0, 0))
        .collect();

    let mut len = 0.0;
    for (i, &(dx, dy)) in steps.iter().enumerate() {
        if dx.abs() > 1 || dy.abs() > 1 {
            len += ((dx * dx + dy * dy) as f64).sqrt();
        } else if dx == 0 || dy == 0 {
            len += AXIAL_STEP;
        } else {
            len += DIAGONAL_STEP;
        }

        let prev = steps[(i + steps.len() - 1) % steps.len()];
        if prev != (dx, dy) {
            len -= CORNER;
        }
    }

    len.max(0.0)
}

/// `4π·area / perimeter²`, clamped to `[0, 1]`.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= EPS {
        return if area <= 1.0 { 1.0 } else { 0.0 };
    }

    (4.0 * std::f64::consts::PI * area / (perimeter * perimeter)).clamp(0.0, 1.0)
}

/// Unsigned shoelace area of a closed polygon.
pub fn polygon_area(poly: &[Point<i32>]) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }

    let twice: i64 = poly
        .iter()
        .zip(poly.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    twice.abs() as f64 * 0.5
}

/// Pixel area over the area of the convex hull of the region's pixel squares.
///
/// The hull is taken over the corners of the border pixels so a filled convex region scores
/// close to 1.
pub fn convexity(area: f64, border: &[Point<i32>]) -> f64 {
    let corners = unique_points(border.iter().flat_map(|p| {
        [
            Point::new(p.x, p.y),
            Point::new(p.x + 1, p.y),
            Point::new(p.x, p.y + 1),
            Point::new(p.x + 1, p.y + 1),
        ]
    }));

    let hull_area = polygon_area(&convex_hull(corners));
    if hull_area <= EPS {
        return 1.0;
    }

    (area / hull_area).clamp(0.0, 1.0)
}

/// Smallest circle containing every border pixel centre.
pub fn min_enclosing_circle(border: &[Point<i32>]) -> Circle {
    let hull: Vec<(f64, f64)> = convex_hull(unique_points(border.iter().copied()))
        .into_iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect();

    let Some(&first) = hull.first() else {
        return Circle {
            x: 0.0,
            y: 0.0,
            radius: 0.0,
        };
    };

    // Incremental construction over the hull points
    let mut c = Circle {
        x: first.0,
        y: first.1,
        radius: 0.0,
    };
    for i in 1..hull.len() {
        if c.contains(hull[i]) {
            continue;
        }
        c = Circle {
            x: hull[i].0,
            y: hull[i].1,
            radius: 0.0,
        };
        for j in 0..i {
            if c.contains(hull[j]) {
                continue;
            }
            c = Circle::through2(hull[i], hull[j]);
            for k in 0..j {
                if !c.contains(hull[k]) {
                    c = Circle::through3(hull[i], hull[j], hull[k]);
                }
            }
        }
    }

    c
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_border(x0: i32, y0: i32, side: i32) -> Vec<Point<i32>> {
        let s = side - 1;
        let mut pts = Vec::new();
        for x in 0..s {
            pts.push(Point::new(x0 + x, y0));
        }
        for y in 0..s {
            pts.push(Point::new(x0 + s, y0 + y));
        }
        for x in (1..=s).rev() {
            pts.push(Point::new(x0 + x, y0 + s));
        }
        for y in (1..=s).rev() {
            pts.push(Point::new(x0, y0 + y));
        }
        pts
    }

    #[test]
    fn line_has_zero_inertia() {
        let mut m = Moments::default();
        for x in 0..20 {
            m.push(x, 3);
        }
        assert_abs_diff_eq!(m.inertia_ratio(), 0.0, epsilon = 1e-9);
        assert_eq!(m.centroid(), (9.5, 3.0));
    }

    #[test]
    fn square_has_unit_inertia() {
        let mut m = Moments::default();
        for y in 0..10 {
            for x in 0..10 {
                m.push(x, y);
            }
        }
        assert_abs_diff_eq!(m.inertia_ratio(), 1.0, epsilon = 1e-9);
        assert_eq!(m.area(), 100.0);
    }

    #[test]
    fn filled_square_is_convex() {
        let border = square_border(2, 2, 10);
        assert_abs_diff_eq!(convexity(100.0, &border), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn square_border_length_is_close_to_its_side_sum() {
        let border = square_border(0, 0, 11);
        let len = border_length(&border);
        // 40 axial steps and 4 corners
        assert_abs_diff_eq!(len, 40.0 * AXIAL_STEP - 4.0 * CORNER, epsilon = 1e-9);
    }

    #[test]
    fn enclosing_circle_of_square() {
        let c = min_enclosing_circle(&square_border(0, 0, 11));
        assert_abs_diff_eq!(c.x, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.y, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c.radius, 50f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn single_pixel_is_round() {
        assert_eq!(circularity(1.0, 0.0), 1.0);
        assert_eq!(min_enclosing_circle(&[Point::new(3, 4)]).radius, 0.0);
    }
}
