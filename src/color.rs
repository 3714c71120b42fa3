use std::fmt::Write as _;

use palette::Srgb;

// ---------------------------------------------------------------------------
// Dark DCS theme shared by the page stylesheet and the chart figures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Srgb<u8>,
    pub panel: Srgb<u8>,
    pub chart: Srgb<u8>,
    pub grid: Srgb<u8>,
    pub text: Srgb<u8>,
    pub muted: Srgb<u8>,
    pub accent: Srgb<u8>,
    pub border: Srgb<u8>,
    pub good: Srgb<u8>,
    pub danger: Srgb<u8>,
    /// Border of the sync master chart.
    pub master: Srgb<u8>,
    /// One colour per series slot.
    pub traces: [Srgb<u8>; 6],
}

pub const THEME: Theme = Theme {
    background: Srgb::new(0x0d, 0x11, 0x17),
    panel: Srgb::new(0x16, 0x1b, 0x22),
    chart: Srgb::new(0x0d, 0x11, 0x17),
    grid: Srgb::new(0x30, 0x36, 0x3d),
    text: Srgb::new(0xc9, 0xd1, 0xd9),
    muted: Srgb::new(0x8b, 0x94, 0x9e),
    accent: Srgb::new(0x58, 0xa6, 0xff),
    border: Srgb::new(0x30, 0x36, 0x3d),
    good: Srgb::new(0x3f, 0xb9, 0x50),
    danger: Srgb::new(0xf8, 0x51, 0x49),
    master: Srgb::new(0x00, 0xe5, 0xff),
    traces: [
        Srgb::new(0x58, 0xa6, 0xff),
        Srgb::new(0x3f, 0xb9, 0x50),
        Srgb::new(0xf0, 0x88, 0x3e),
        Srgb::new(0xbc, 0x8c, 0xff),
        Srgb::new(0xf7, 0x78, 0xba),
        Srgb::new(0x79, 0xc0, 0xff),
    ],
};

/// `#rrggbb`.
pub fn css_hex(color: Srgb<u8>) -> String {
    format!("#{color:x}")
}

/// `rgba(r,g,b,a)`.
pub fn css_rgba(color: Srgb<u8>, alpha: f32) -> String {
    format!(
        "rgba({},{},{},{})",
        color.red,
        color.green,
        color.blue,
        alpha.clamp(0.0, 1.0)
    )
}

impl Theme {
    pub fn trace(&self, slot: usize) -> Srgb<u8> {
        self.traces[slot % self.traces.len()]
    }

    /// CSS custom properties consumed by the dashboard page.
    pub fn stylesheet(&self) -> String {
        let vars = [
            ("bg", self.background),
            ("panel", self.panel),
            ("chart", self.chart),
            ("grid", self.grid),
            ("text", self.text),
            ("muted", self.muted),
            ("accent", self.accent),
            ("border", self.border),
            ("good", self.good),
            ("danger", self.danger),
            ("master", self.master),
        ];
        let mut css = String::from(":root {\n");
        for (name, color) in vars {
            let _ = writeln!(css, "  --{name}: {};", css_hex(color));
        }
        for (i, color) in self.traces.iter().enumerate() {
            let _ = writeln!(css, "  --trace-{}: {};", i + 1, css_hex(*color));
        }
        css.push_str("}\n");
        css
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(css_hex(THEME.accent), "#58a6ff");
        assert_eq!(css_hex(THEME.master), "#00e5ff");
        assert_eq!(css_rgba(THEME.panel, 0.9), "rgba(22,27,34,0.9)");
    }

    #[test]
    fn trace_slots_wrap() {
        assert_eq!(THEME.trace(0), THEME.trace(6));
        assert_eq!(css_hex(THEME.trace(2)), "#f0883e");
    }

    #[test]
    fn stylesheet_lists_every_colour() {
        let css = THEME.stylesheet();
        assert!(css.contains("--bg: #0d1117;"));
        assert!(css.contains("--trace-6: #79c0ff;"));
    }
}
