//! RGBA color values and lenient hex parsing.

use glam::Vec4;

/// An RGBA color with components in the `[0, 1]` range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    /// Parse a `#rgb` or `#rrggbb` hex string (leading `#` optional).
    ///
    /// Returns `None` on malformed input; callers that must never fail
    /// use [`from_hex_or`](Self::from_hex_or).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().strip_prefix('#').unwrap_or(s.trim());
        let channel = |hi: u32, lo: u32| (hi * 16 + lo) as f32 / 255.0;
        let digits: Vec<u32> = s.chars().map(|c| c.to_digit(16)).collect::<Option<_>>()?;
        match digits.as_slice() {
            [r, g, b] => Some(Self::rgb(
                channel(*r, *r),
                channel(*g, *g),
                channel(*b, *b),
            )),
            [r1, r2, g1, g2, b1, b2] => Some(Self::rgb(
                channel(*r1, *r2),
                channel(*g1, *g2),
                channel(*b1, *b2),
            )),
            _ => None,
        }
    }

    /// Parse a hex color string, falling back to `default` if it is malformed.
    ///
    /// Parameter strings come from untrusted tweak-panel input; a bad value
    /// must not abort the frame.
    pub fn from_hex_or(s: &str, default: Color) -> Self {
        match Self::from_hex(s) {
            Some(color) => color,
            None => {
                eprintln!("[color] unparseable color '{s}', using default");
                default
            }
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    pub(crate) fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_hex() {
        let c = Color::from_hex("#aa00ff").unwrap();
        assert!((c.r - 170.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.g, 0.0);
        assert_eq!(c.b, 1.0);
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn parses_short_hex_without_hash() {
        let c = Color::from_hex("f0f").unwrap();
        assert_eq!(c, Color::rgb(1.0, 0.0, 1.0));
    }

    #[test]
    fn malformed_falls_back_to_default() {
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("zzz"), None);
        let fallback = Color::rgb(0.5, 0.5, 0.5);
        assert_eq!(Color::from_hex_or("not-a-color", fallback), fallback);
    }
}
