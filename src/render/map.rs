//! Colour palettes.
//!
//! Each palette is a 256-entry RGB table generated once at construction.
//! Entry 0 is never looked up directly; level 0 is drawn in the palette's
//! background colour. Rotation is a display-time offset applied at lookup,
//! so the base table never changes and setting the same rotation twice is
//! a no-op rather than a cumulative shift.

use crate::render::scale::MAX_LEVEL;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColourMapKind {
    Default,
    WhiteOnBlack,
    BlackOnWhite,
    RedOnBlue,
    YellowOnBlack,
    BlueOnBlack,
    Sunset,
    FruitSalad,
}

impl ColourMapKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColourMapKind::Default => "Default",
            ColourMapKind::WhiteOnBlack => "White on Black",
            ColourMapKind::BlackOnWhite => "Black on White",
            ColourMapKind::RedOnBlue => "Red on Blue",
            ColourMapKind::YellowOnBlack => "Yellow on Black",
            ColourMapKind::BlueOnBlack => "Blue on Black",
            ColourMapKind::Sunset => "Sunset",
            ColourMapKind::FruitSalad => "Fruit Salad",
        }
    }
}

pub struct ColourMap {
    kind: ColourMapKind,
    entries: Box<[[u8; 3]; 256]>,
    rotation: i32,
}

impl ColourMap {
    pub fn new(kind: ColourMapKind) -> Self {
        let mut entries = Box::new([[0u8; 3]; 256]);
        for (i, entry) in entries.iter_mut().enumerate() {
            // Data levels run 1..=255; entry 0 is a placeholder.
            let norm = ((i as f32 - 1.0) / (MAX_LEVEL as f32 - 1.0)).clamp(0.0, 1.0);
            *entry = palette_colour(kind, norm);
        }
        ColourMap {
            kind,
            entries,
            rotation: 0,
        }
    }

    pub fn kind(&self) -> ColourMapKind {
        self.kind
    }

    pub fn rotation(&self) -> i32 {
        self.rotation
    }

    /// Set the absolute rotation offset.
    pub fn set_rotation(&mut self, rotation: i32) {
        self.rotation = rotation;
    }

    /// Adjust the rotation by a delta.
    pub fn rotate(&mut self, delta: i32) {
        self.rotation += delta;
    }

    pub fn has_light_background(&self) -> bool {
        self.kind == ColourMapKind::BlackOnWhite
    }

    pub fn background(&self) -> [u8; 3] {
        if self.has_light_background() {
            [255, 255, 255]
        } else {
            [0, 0, 0]
        }
    }

    /// Colour for a level, with level 0 as background and the rotation
    /// offset wrapped through 1..=255.
    #[inline]
    pub fn colour_for_level(&self, level: u8) -> [u8; 3] {
        if level == 0 {
            return self.background();
        }
        let mut target = level as i32 + self.rotation;
        let max = MAX_LEVEL as i32;
        while target < 1 {
            target += max;
        }
        while target > max {
            target -= max;
        }
        self.entries[target as usize]
    }
}

fn palette_colour(kind: ColourMapKind, norm: f32) -> [u8; 3] {
    let blue = 0.6666f32;
    let pieslice = 0.3333f32;

    match kind {
        ColourMapKind::Default => hsv_to_rgb(
            blue - norm * 2.0 * pieslice,
            0.5 + norm / 2.0,
            norm,
        ),
        ColourMapKind::WhiteOnBlack => grey(norm),
        ColourMapKind::BlackOnWhite => grey(1.0 - norm),
        ColourMapKind::RedOnBlue => hsv_to_rgb(
            blue - pieslice / 4.0 + norm * (pieslice + pieslice / 4.0),
            1.0,
            norm,
        ),
        ColourMapKind::YellowOnBlack => hsv_to_rgb(0.15, 1.0, norm),
        ColourMapKind::BlueOnBlack => {
            let mut v = norm * 2.0;
            let mut s = 1.0;
            if v > 1.0 {
                v = 1.0;
                s = 1.0 - (norm.sqrt() - 0.707) * 3.414;
            }
            hsv_to_rgb(blue, s, v)
        }
        ColourMapKind::Sunset => {
            let r = ((norm - 0.24) * 2.38).clamp(0.0, 1.0);
            let g = ((norm - 0.64) * 2.777).clamp(0.0, 1.0);
            let mut b = 3.6 * norm;
            if norm > 0.277 {
                b = 2.0 - b;
            }
            rgb(r, g, b.clamp(0.0, 1.0))
        }
        ColourMapKind::FruitSalad => {
            let mut h = blue + pieslice / 2.0 - norm;
            if h < 0.0 {
                h += 1.0;
            }
            hsv_to_rgb(h, 1.0, 1.0)
        }
    }
}

fn grey(v: f32) -> [u8; 3] {
    rgb(v, v, v)
}

fn rgb(r: f32, g: f32, b: f32) -> [u8; 3] {
    [
        (r.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        (g.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        (b.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
    ]
}

/// h, s, v in [0, 1], h wrapping.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = (h.rem_euclid(1.0)) * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ColourMapKind; 8] = [
        ColourMapKind::Default,
        ColourMapKind::WhiteOnBlack,
        ColourMapKind::BlackOnWhite,
        ColourMapKind::RedOnBlue,
        ColourMapKind::YellowOnBlack,
        ColourMapKind::BlueOnBlack,
        ColourMapKind::Sunset,
        ColourMapKind::FruitSalad,
    ];

    #[test]
    fn greyscale_palettes_are_exact() {
        let wob = ColourMap::new(ColourMapKind::WhiteOnBlack);
        assert_eq!(wob.colour_for_level(1), [0, 0, 0]);
        assert_eq!(wob.colour_for_level(255), [255, 255, 255]);

        let bow = ColourMap::new(ColourMapKind::BlackOnWhite);
        assert_eq!(bow.colour_for_level(1), [255, 255, 255]);
        assert_eq!(bow.colour_for_level(255), [0, 0, 0]);
    }

    #[test]
    fn level_zero_is_background() {
        for kind in ALL {
            let map = ColourMap::new(kind);
            let expected = if kind == ColourMapKind::BlackOnWhite {
                [255, 255, 255]
            } else {
                [0, 0, 0]
            };
            assert_eq!(map.colour_for_level(0), expected, "{kind:?}");
        }
    }

    #[test]
    fn only_black_on_white_has_light_background() {
        for kind in ALL {
            let light = ColourMap::new(kind).has_light_background();
            assert_eq!(light, kind == ColourMapKind::BlackOnWhite, "{kind:?}");
        }
    }

    #[test]
    fn set_rotation_is_absolute_not_cumulative() {
        let mut map = ColourMap::new(ColourMapKind::Default);
        let baseline = map.colour_for_level(100);

        map.set_rotation(40);
        let rotated = map.colour_for_level(100);
        map.set_rotation(40);
        assert_eq!(map.colour_for_level(100), rotated);

        map.set_rotation(0);
        assert_eq!(map.colour_for_level(100), baseline);
    }

    #[test]
    fn rotation_relabels_within_existing_palette() {
        let mut map = ColourMap::new(ColourMapKind::Sunset);
        let unrotated = map.colour_for_level(60);
        map.set_rotation(-20);
        assert_eq!(map.colour_for_level(80), unrotated);
    }

    #[test]
    fn rotation_wraps_through_valid_levels() {
        let mut map = ColourMap::new(ColourMapKind::Default);
        map.set_rotation(255);
        // A full turn is the identity.
        assert_eq!(map.colour_for_level(10), {
            let plain = ColourMap::new(ColourMapKind::Default);
            plain.colour_for_level(10)
        });
        map.set_rotation(-9);
        // Wraps below 1 back through 255.
        let plain = ColourMap::new(ColourMapKind::Default);
        assert_eq!(map.colour_for_level(5), plain.colour_for_level(251));
    }

    #[test]
    fn rotate_and_unrotate_restore_exactly() {
        let mut map = ColourMap::new(ColourMapKind::FruitSalad);
        let before: Vec<[u8; 3]> = (1..=255).map(|l| map.colour_for_level(l)).collect();
        map.rotate(10);
        map.rotate(-10);
        let after: Vec<[u8; 3]> = (1..=255).map(|l| map.colour_for_level(l)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn rotate_is_relative_to_current() {
        let mut map = ColourMap::new(ColourMapKind::Default);
        map.rotate(10);
        map.rotate(10);
        assert_eq!(map.rotation(), 20);
        let mut abs = ColourMap::new(ColourMapKind::Default);
        abs.set_rotation(20);
        assert_eq!(map.colour_for_level(77), abs.colour_for_level(77));
    }
}
