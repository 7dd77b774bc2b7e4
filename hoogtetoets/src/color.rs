//! Green -> red colouring of fill values for the map layer.

use ndarray::Array1;
use serde::Serialize;

/// Linear RGB triple, each channel in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const NEUTRAL_GREY: Rgb = Rgb {
        r: 0.5,
        g: 0.5,
        b: 0.5,
    };

    pub fn to_rgb8(&self) -> [u8; 3] {
        let channel = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [channel(self.r), channel(self.g), channel(self.b)]
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

/// `t = clip(fill, 0, 1)` metres maps to `(t, 1 - t, 0)`; a missing fill is grey.
pub fn color_for(fill: f64) -> Rgb {
    if fill.is_nan() {
        return Rgb::NEUTRAL_GREY;
    }
    let t = fill.clamp(0.0, 1.0);
    Rgb {
        r: t,
        g: 1.0 - t,
        b: 0.0,
    }
}

pub fn colors_for(fill: &Array1<f64>) -> Vec<Rgb> {
    fill.iter().map(|&v| color_for(v)).collect()
}
