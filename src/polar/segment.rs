//! The AHA 17-segment model on a `[radius, azimuth]` activity map.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::fmt;

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Basal,
    Mid,
    Apical,
    Apex,
}

/// One myocardial segment: an angle range (degrees, clockwise from
/// 12 o'clock, wrapping through 0 when `start > end`) times a radius range
/// (fraction of the map radius).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub id: u8,
    pub location: Location,
    pub name: &'static str,
    angles_deg: (f64, f64),
    pub radius_range: (f64, f64),
}

impl Segment {
    const fn new(
        id: u8,
        location: Location,
        name: &'static str,
        angles_deg: (f64, f64),
        radius_range: (f64, f64),
    ) -> Self {
        Self {
            id,
            location,
            name,
            angles_deg,
            radius_range,
        }
    }

    /// `(start, end)` in radians.
    pub fn angle_range(&self) -> (f64, f64) {
        (self.angles_deg.0.to_radians(), self.angles_deg.1.to_radians())
    }

    pub fn wraps(&self) -> bool {
        self.angles_deg.0 > self.angles_deg.1
    }

    fn contains_angle(&self, angle: f64) -> bool {
        let (start, end) = self.angle_range();
        if self.wraps() {
            angle >= start || angle < end
        } else {
            start <= angle && angle < end
        }
    }

    /// Half-open row range covered on a map with `rows` radius rows.
    fn rows(&self, rows: usize) -> (usize, usize) {
        let (inner, outer) = self.radius_range;
        let at = |f: f64| (f * rows as f64).round_ties_even() as usize;
        (at(inner), at(outer))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.id, self.location, self.name)
    }
}

const BASAL: (f64, f64) = (0.75, 1.0);
const MID: (f64, f64) = (0.5, 0.75);
const APICAL: (f64, f64) = (0.25, 0.5);

pub static SEGMENTS: [Segment; 17] = [
    Segment::new(1, Location::Basal, "anterior", (330.0, 30.0), BASAL),
    Segment::new(2, Location::Basal, "anteroseptal", (270.0, 330.0), BASAL),
    Segment::new(3, Location::Basal, "inferoseptal", (210.0, 270.0), BASAL),
    Segment::new(4, Location::Basal, "inferior", (150.0, 210.0), BASAL),
    Segment::new(5, Location::Basal, "inferolateral", (90.0, 150.0), BASAL),
    Segment::new(6, Location::Basal, "anterolateral", (30.0, 90.0), BASAL),
    Segment::new(7, Location::Mid, "anterior", (330.0, 30.0), MID),
    Segment::new(8, Location::Mid, "anteroseptal", (270.0, 330.0), MID),
    Segment::new(9, Location::Mid, "inferoseptal", (210.0, 270.0), MID),
    Segment::new(10, Location::Mid, "inferior", (150.0, 210.0), MID),
    Segment::new(11, Location::Mid, "inferolateral", (90.0, 150.0), MID),
    Segment::new(12, Location::Mid, "anterolateral", (30.0, 90.0), MID),
    Segment::new(13, Location::Apical, "anterior", (315.0, 45.0), APICAL),
    Segment::new(14, Location::Apical, "septal", (225.0, 315.0), APICAL),
    Segment::new(15, Location::Apical, "inferior", (135.0, 225.0), APICAL),
    Segment::new(16, Location::Apical, "lateral", (45.0, 135.0), APICAL),
    Segment::new(17, Location::Apex, "apex", (0.0, 360.0), (0.0, 0.25)),
];

/// Pixels of `activity` belonging to `segment`.
///
/// Column `c` has the azimuth `angles[c]`, by default `2π c / cols`.
pub fn segment_mask(
    activity: &ArrayView2<f64>,
    segment: &Segment,
    angles: Option<&[f64]>,
) -> Array2<bool> {
    let (rows, cols) = activity.dim();
    let default_angles;
    let angles = match angles {
        Some(angles) => angles,
        None => {
            default_angles = (0..cols)
                .map(|c| TAU * c as f64 / cols as f64)
                .collect::<Vec<_>>();
            &default_angles
        }
    };
    let in_angle: Vec<bool> = angles.iter().map(|&a| segment.contains_angle(a)).collect();
    let (first_row, end_row) = segment.rows(rows);

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        (first_row..end_row).contains(&r) && in_angle.get(c).copied().unwrap_or(false)
    })
}

/// `(x, y)` offset of a polar position, angle 0 at 12 o'clock.
pub fn polar_to_cartesian(radius: f64, angle: f64) -> (f64, f64) {
    let angle = angle - FRAC_PI_2;
    (radius * angle.cos(), radius * angle.sin())
}

/// Corners of the segment box on a map of radius `radius` px, ordered
/// `(start, inner), (start, outer), (end, inner), (end, outer)`.
pub fn segment_vertices(segment: &Segment, radius: f64) -> [(i32, i32); 4] {
    let (a0, a1) = segment.angle_range();
    let (r0, r1) = segment.radius_range;
    let corner = |angle: f64, fraction: f64| {
        let (x, y) = polar_to_cartesian(fraction * radius, angle);
        (
            (radius + x).round_ties_even() as i32,
            (radius + y).round_ties_even() as i32,
        )
    };
    [corner(a0, r0), corner(a0, r1), corner(a1, r0), corner(a1, r1)]
}

/// Label position of the segment on a map of radius `radius` px.
pub fn segment_center(segment: &Segment, radius: f64) -> (i32, i32) {
    let middle = radius.round_ties_even() as i32;
    if segment.location == Location::Apex {
        return (middle, middle);
    }
    let (a0, a1) = segment.angle_range();
    let mean_angle = if segment.wraps() {
        (a0 - TAU + a1) / 2.0
    } else {
        (a0 + a1) / 2.0
    };
    let mean_radius = (segment.radius_range.0 + segment.radius_range.1) / 2.0;
    let (x, y) = polar_to_cartesian(mean_radius * radius, mean_angle);
    (
        (radius + x).round_ties_even() as i32,
        (radius + y).round_ties_even() as i32,
    )
}

/// `round(100 * mean)` over the segment, 0 if the region is empty, all zero
/// or contains NaN.
pub fn segment_score(activity: &ArrayView2<f64>, segment: &Segment) -> u8 {
    let mask = segment_mask(activity, segment, None);
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut nan = false;
    Zip::from(activity).and(&mask).for_each(|&v, &inside| {
        if inside {
            count += 1;
            sum += v;
            max = max.max(v);
            nan |= v.is_nan();
        }
    });
    if count == 0 || nan || max == 0.0 {
        return 0;
    }
    (100.0 * sum / count as f64).round_ties_even().clamp(0.0, 100.0) as u8
}

/// Scores of all 17 segments, ordered by segment id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentScores(pub [u8; 17]);

impl SegmentScores {
    pub fn compute(activity: &ArrayView2<f64>) -> Self {
        Self(SEGMENTS.map(|segment| segment_score(activity, &segment)))
    }

    pub fn get(&self, id: u8) -> Option<u8> {
        usize::from(id)
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static Segment, u8)> + '_ {
        SEGMENTS.iter().zip(self.0.iter().copied())
    }
}

impl fmt::Display for SegmentScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.map(|s| s.to_string()).join(";");
        f.write_str(&joined)
    }
}
