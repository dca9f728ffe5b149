use serde::{Deserialize, Serialize};

/// Lamp color. Serialized as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_black(self) -> bool {
        self == Self::BLACK
    }

    /// Linear blend, `t` clamped to [0, 1]; truncates toward `self` like the LED fades.
    pub fn lerp(self, to: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
        Rgb::new(mix(self.r, to.r), mix(self.g, to.g), mix(self.b, to.b))
    }

    /// Scale every channel by `factor` in [0, 1].
    pub fn dim(self, factor: f32) -> Rgb {
        Rgb::BLACK.lerp(self, factor)
    }

    /// Fully saturated color for a hue in degrees.
    pub fn from_hue(hue: f32) -> Rgb {
        let h = hue.rem_euclid(360.0) / 60.0;
        let x = 1.0 - (h % 2.0 - 1.0).abs();
        let (r, g, b) = match h as u32 {
            0 => (1.0, x, 0.0),
            1 => (x, 1.0, 0.0),
            2 => (0.0, 1.0, x),
            3 => (0.0, x, 1.0),
            4 => (x, 0.0, 1.0),
            _ => (1.0, 0.0, x),
        };
        let to_u8 = |v: f32| (v * 255.0).round() as u8;
        Rgb::new(to_u8(r), to_u8(g), to_u8(b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Rgb::new(c[0], c[1], c[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.r, c.g, c.b]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_endpoints() {
        let a = Rgb::new(0, 100, 200);
        let b = Rgb::new(200, 100, 0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Rgb::new(100, 100, 100));
        assert_eq!(a.lerp(b, 7.0), b);
    }

    #[test]
    fn test_dim() {
        assert_eq!(Rgb::WHITE.dim(0.0), Rgb::BLACK);
        assert_eq!(Rgb::WHITE.dim(1.0), Rgb::WHITE);
        assert!(Rgb::new(3, 3, 3).dim(0.1).is_black());
    }

    #[test]
    fn test_from_hue_primaries() {
        assert_eq!(Rgb::from_hue(0.0), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::from_hue(120.0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hue(240.0), Rgb::new(0, 0, 255));
        assert_eq!(Rgb::from_hue(360.0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Rgb = serde_json::from_str("[255,0,9]").unwrap();
        assert_eq!(back, Rgb::new(255, 0, 9));
    }
}
