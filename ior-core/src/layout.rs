//! Screen geometry for the task.
//!
//! ```text
//!   [1]      [2]
//!        ( )          upper fixation, 2 offsets above centre
//!   [3]      [4]
//!         +           centre fixation
//!   [5]      [6]
//!        ( )          lower fixation, 2 offsets below centre
//!   [7]      [8]
//! ```
//!
//! Placeholders sit one offset left/right of the vertical midline and one or
//! three offsets above/below centre.

use crate::location::{FixationPoint, PlaceholderId};

/// Circular gaze region in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub center: (f32, f32),
    pub radius: f32,
}

impl Boundary {
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let dx = point.0 - self.center.0;
        let dy = point.1 - self.center.1;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub px_per_degree: f32,
    pub offset_deg: f32,
    pub boundary_radius_deg: f32,
}

impl Layout {
    pub fn new(width: u32, height: u32, px_per_degree: f32) -> Self {
        Self {
            width,
            height,
            px_per_degree,
            offset_deg: 6.0,
            boundary_radius_deg: 1.5,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }

    pub fn deg_to_px(&self, deg: f32) -> f32 {
        deg * self.px_per_degree
    }

    fn offset(&self) -> f32 {
        self.deg_to_px(self.offset_deg)
    }

    pub fn placeholder(&self, id: PlaceholderId) -> (f32, f32) {
        let (cx, cy) = self.center();
        let o = self.offset();
        let x = if id.is_left() { cx - o } else { cx + o };
        // rows 0..=3 sit at -3, -1, +1, +3 offsets
        let y = cy + (2.0 * id.row() as f32 - 3.0) * o;
        (x, y)
    }

    pub fn fixation(&self, point: FixationPoint) -> (f32, f32) {
        let (cx, cy) = self.center();
        let o = self.offset();
        match point {
            FixationPoint::Upper => (cx, cy - 2.0 * o),
            FixationPoint::Middle => (cx, cy),
            FixationPoint::Lower => (cx, cy + 2.0 * o),
        }
    }

    pub fn boundary(&self, point: FixationPoint) -> Boundary {
        Boundary {
            center: self.fixation(point),
            radius: self.deg_to_px(self.boundary_radius_deg),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}
