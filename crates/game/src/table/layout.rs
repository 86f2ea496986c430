use glam::{Vec2, Vec3};

use super::ball::RACK_ORDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PocketKind {
    Corner,
    Side,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pocket {
    pub index: u8,
    pub kind: PocketKind,
    pub center: Vec2,
    pub capture_radius: f32,
}

/// Table geometry in metres. The playing surface lies in the XZ plane with its
/// centre at the origin; X runs along the length, the head end is at negative X.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub length: f32,
    pub width: f32,
    pub cushion_thickness: f32,
    pub cushion_height: f32,
    pub cushion_restitution: f32,
    pub cushion_friction: f32,

    pub corner_mouth: f32,
    pub side_mouth: f32,
    pub corner_capture_radius: f32,
    pub side_capture_radius: f32,
    pub pocket_setback: f32,
    pub out_of_bounds_margin: f32,

    pub ball_radius: f32,
    pub ball_mass: f32,
    pub ball_restitution: f32,
    pub ball_friction: f32,
    pub rack_gap: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            length: 2.54,
            width: 1.27,
            cushion_thickness: 0.05,
            cushion_height: 0.06,
            cushion_restitution: 0.75,
            cushion_friction: 0.2,

            corner_mouth: 0.11,
            side_mouth: 0.12,
            corner_capture_radius: 0.065,
            side_capture_radius: 0.06,
            pocket_setback: 0.015,
            out_of_bounds_margin: 0.12,

            ball_radius: 0.028575,
            ball_mass: 0.17,
            ball_restitution: 0.95,
            ball_friction: 0.05,
            rack_gap: 0.0005,
        }
    }
}

impl TableConfig {
    pub fn half_length(&self) -> f32 {
        self.length / 2.0
    }

    pub fn half_width(&self) -> f32 {
        self.width / 2.0
    }

    /// Four corners then the two side pockets.
    pub fn pockets(&self) -> [Pocket; 6] {
        let hl = self.half_length() + self.pocket_setback;
        let hw = self.half_width() + self.pocket_setback;
        let corner = |index, x, z| Pocket {
            index,
            kind: PocketKind::Corner,
            center: Vec2::new(x, z),
            capture_radius: self.corner_capture_radius,
        };
        let side = |index, z| Pocket {
            index,
            kind: PocketKind::Side,
            center: Vec2::new(0.0, z),
            capture_radius: self.side_capture_radius,
        };
        [
            corner(0, -hl, -hw),
            corner(1, hl, -hw),
            corner(2, -hl, hw),
            corner(3, hl, hw),
            side(4, -hw),
            side(5, hw),
        ]
    }

    pub fn nearest_pocket(&self, position: Vec2) -> Pocket {
        let pockets = self.pockets();
        let mut best = pockets[0];
        let mut best_dist = f32::MAX;
        for pocket in pockets {
            let dist = pocket.center.distance_squared(position);
            if dist < best_dist {
                best_dist = dist;
                best = pocket;
            }
        }
        best
    }

    pub fn is_out_of_bounds(&self, position: Vec2) -> bool {
        position.x.abs() > self.half_length() + self.out_of_bounds_margin
            || position.y.abs() > self.half_width() + self.out_of_bounds_margin
    }

    /// Whether a ball centre at `position` sits fully on the cloth.
    pub fn is_on_cloth(&self, position: Vec2) -> bool {
        position.x.abs() <= self.half_length() - self.ball_radius
            && position.y.abs() <= self.half_width() - self.ball_radius
    }

    /// Cushion segments as (centre, half extents). Each rail is split around the
    /// pocket mouths so balls can leave the table there.
    pub fn cushions(&self) -> Vec<(Vec3, Vec3)> {
        let hl = self.half_length();
        let hw = self.half_width();
        let t = self.cushion_thickness;
        let hy = self.cushion_height / 2.0;
        let mut segments = Vec::with_capacity(6);

        // Long rails: corner mouth to side mouth, both halves, both sides.
        let long_start = -hl + self.corner_mouth;
        let long_end = -self.side_mouth / 2.0;
        let long_half = (long_end - long_start) / 2.0;
        for z_sign in [-1.0f32, 1.0] {
            let z = z_sign * (hw + t / 2.0);
            for x_sign in [-1.0f32, 1.0] {
                let x = x_sign * (long_start + long_half).abs();
                segments.push((Vec3::new(x, 0.0, z), Vec3::new(long_half, hy, t / 2.0)));
            }
        }

        // Short rails between the corner mouths.
        let short_half = hw - self.corner_mouth;
        for x_sign in [-1.0f32, 1.0] {
            let x = x_sign * (hl + t / 2.0);
            segments.push((Vec3::new(x, 0.0, 0.0), Vec3::new(t / 2.0, hy, short_half)));
        }

        segments
    }

    pub fn head_spot(&self) -> Vec2 {
        Vec2::new(-self.half_length() / 2.0, 0.0)
    }

    pub fn foot_spot(&self) -> Vec2 {
        Vec2::new(self.half_length() / 2.0, 0.0)
    }

    /// Rack positions keyed by ball number, apex on the foot spot and rows growing
    /// toward the foot rail.
    pub fn rack(&self) -> [(u8, Vec2); 15] {
        let spacing = self.ball_radius * 2.0 + self.rack_gap;
        let row_offset = spacing * 3.0f32.sqrt() / 2.0;
        let apex = self.foot_spot();

        let mut positions = [(0u8, Vec2::ZERO); 15];
        let mut slot = 0;
        for row in 0..5usize {
            for col in 0..=row {
                let x = apex.x + row as f32 * row_offset;
                let z = apex.y + (col as f32 - row as f32 / 2.0) * spacing;
                positions[slot] = (RACK_ORDER[slot], Vec2::new(x, z));
                slot += 1;
            }
        }
        positions
    }

    /// Centre of the rack, where the eight ball sits.
    pub fn rack_center(&self) -> Vec2 {
        let spacing = self.ball_radius * 2.0 + self.rack_gap;
        let row_offset = spacing * 3.0f32.sqrt() / 2.0;
        self.foot_spot() + Vec2::new(2.0 * row_offset, 0.0)
    }
}
