//! Region algebra over rectangle lists.
//!
//! A [`Region`] is a set of pixels stored as a minimal list of non-overlapping
//! rects in canonical band order: rects are split at every horizontal edge,
//! intervals are merged within each band, and vertically adjacent bands with
//! identical interval sets are coalesced. Two regions covering the same pixels
//! therefore compare equal.

use serde::{Deserialize, Serialize};

use crate::geometry::{Matrix, Rect, map_rect};

/// Coordinate origin of the display/codec backend a damage list is handed to.
///
/// GL-family backends address the framebuffer from the bottom-left corner and
/// need flipped damage rects; Vulkan-family backends are top-left native.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsOrigin {
    TopLeft,
    BottomLeft,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

#[derive(Clone, Copy)]
enum Op {
    Union,
    Intersect,
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        if rect.is_empty() {
            Region::default()
        } else {
            Region { rects: vec![rect] }
        }
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a region from arbitrary (possibly overlapping) rects.
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let mut region = Region::default();
        for rect in rects {
            region.or_self(&Region::from(rect));
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn into_rects(self) -> Vec<Rect> {
        self.rects
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Total covered area. Exact because stored rects never overlap.
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding rect of the whole region.
    pub fn bound(&self) -> Rect {
        self.rects.iter().fold(Rect::ZERO, |acc, r| acc.join(r))
    }

    pub fn or(&self, other: &Region) -> Region {
        Region { rects: combine(&self.rects, &other.rects, Op::Union) }
    }

    pub fn and(&self, other: &Region) -> Region {
        Region { rects: combine(&self.rects, &other.rects, Op::Intersect) }
    }

    pub fn or_self(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.rects = other.rects.clone();
            return;
        }
        self.rects = combine(&self.rects, &other.rects, Op::Union);
    }

    pub fn or_rect(&mut self, rect: &Rect) {
        self.or_self(&Region::from(*rect));
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        !rect.is_empty() && self.rects.iter().any(|r| r.is_intersect(rect))
    }

    /// Snaps every rect outward to the `grid` lattice. The result always
    /// covers the input; alignment never shrinks a region.
    pub fn aligned(&self, grid: i32) -> Region {
        if grid <= 1 {
            return self.clone();
        }
        Region::from_rects(self.rects.iter().map(|r| {
            let left = (r.left).div_euclid(grid) * grid;
            let top = (r.top).div_euclid(grid) * grid;
            let right = ceil_to_grid(r.right(), grid);
            let bottom = ceil_to_grid(r.bottom(), grid);
            Rect::from_ltrb(left, top, right, bottom)
        }))
    }

    /// Maps every rect through `matrix` (corner bounding boxes) and re-unions.
    pub fn map(&self, matrix: &Matrix) -> Region {
        Region::from_rects(self.rects.iter().map(|r| map_rect(r, matrix)))
    }

    /// Whether every pixel of `other` is contained in `self`.
    pub fn covers(&self, other: &Region) -> bool {
        self.and(other).area() == other.area()
    }
}

fn ceil_to_grid(value: i32, grid: i32) -> i32 {
    value.div_euclid(grid) * grid + if value.rem_euclid(grid) != 0 { grid } else { 0 }
}

fn combine(a: &[Rect], b: &[Rect], op: Op) -> Vec<Rect> {
    let mut ys: Vec<i32> = Vec::with_capacity((a.len() + b.len()) * 2);
    for r in a.iter().chain(b.iter()) {
        if r.is_empty() {
            continue;
        }
        ys.push(r.top);
        ys.push(r.bottom());
    }
    ys.sort_unstable();
    ys.dedup();

    // (y0, y1, x-intervals) per band, coalescing identical adjacent bands.
    let mut bands: Vec<(i32, i32, Vec<(i32, i32)>)> = Vec::new();
    for window in ys.windows(2) {
        let (y0, y1) = (window[0], window[1]);
        let ia = band_intervals(a, y0, y1);
        let ib = band_intervals(b, y0, y1);
        let merged = match op {
            Op::Union => union_intervals(ia, ib),
            Op::Intersect => intersect_intervals(&ia, &ib),
        };
        if merged.is_empty() {
            continue;
        }
        if let Some(last) = bands.last_mut() {
            if last.1 == y0 && last.2 == merged {
                last.1 = y1;
                continue;
            }
        }
        bands.push((y0, y1, merged));
    }

    let mut out = Vec::new();
    for (y0, y1, intervals) in bands {
        for (left, right) in intervals {
            out.push(Rect::from_ltrb(left, y0, right, y1));
        }
    }
    out
}

/// X-intervals of rects fully spanning the band, sorted and merged.
/// Bands are delimited by every horizontal edge, so a rect either spans the
/// whole band or misses it entirely.
fn band_intervals(rects: &[Rect], y0: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut intervals: Vec<(i32, i32)> = rects
        .iter()
        .filter(|r| !r.is_empty() && r.top <= y0 && r.bottom() >= y1)
        .map(|r| (r.left, r.right()))
        .collect();
    intervals.sort_unstable();
    merge_sorted_intervals(intervals)
}

fn merge_sorted_intervals(intervals: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    let mut out: Vec<(i32, i32)> = Vec::with_capacity(intervals.len());
    for (left, right) in intervals {
        match out.last_mut() {
            Some(last) if left <= last.1 => last.1 = last.1.max(right),
            _ => out.push((left, right)),
        }
    }
    out
}

fn union_intervals(a: Vec<(i32, i32)>, b: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    let mut all = a;
    all.extend(b);
    all.sort_unstable();
    merge_sorted_intervals(all)
}

fn intersect_intervals(a: &[(i32, i32)], b: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let left = a[i].0.max(b[j].0);
        let right = a[i].1.min(b[j].1);
        if left < right {
            out.push((left, right));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Converts a region to the damage-rect list the display/codec layer expects.
///
/// Bottom-left-origin backends get `top' = rotated_height - bottom`; top-left
/// native backends pass through unchanged.
pub fn screen_intersect_dirty_rects(
    region: &Region,
    rotated_height: i32,
    origin: GraphicsOrigin,
) -> Vec<Rect> {
    region
        .rects()
        .iter()
        .map(|rect| match origin {
            GraphicsOrigin::TopLeft => *rect,
            GraphicsOrigin::BottomLeft => Rect::new(
                rect.left,
                rotated_height - rect.bottom(),
                rect.width,
                rect.height,
            ),
        })
        .collect()
}
