//! Immutable lookup tables computed once per process.
//!
//! The transfer kernels read the byte→float maps from a device copy of these
//! tables, and the wavelet engine pads with [`LookupTables::next_power`].

use std::sync::OnceLock;

/// Number of entries in the power-of-two table.
pub const POWER_TWO_MAX: usize = 16;

/// Byte-to-float maps and the power-of-two ladder.
#[derive(Debug, Clone)]
pub struct LookupTables {
    /// `v / 255`.
    pub norm: [f32; 256],
    /// sRGB electro-optical transfer: display byte to linear light.
    pub srgb_decode: [f32; 256],
    /// `1, 2, 4, ..., 2^(POWER_TWO_MAX-1)`.
    pub powers_of_two: [u32; POWER_TWO_MAX],
}

impl LookupTables {
    /// Compute every table.
    pub fn new() -> Self {
        let mut norm = [0.0f32; 256];
        let mut srgb_decode = [0.0f32; 256];
        for v in 0..256 {
            let x = v as f32 / 255.0;
            norm[v] = x;
            srgb_decode[v] = srgb_to_linear(x);
        }
        let mut powers_of_two = [0u32; POWER_TWO_MAX];
        for (i, p) in powers_of_two.iter_mut().enumerate() {
            *p = 1 << i;
        }
        Self {
            norm,
            srgb_decode,
            powers_of_two,
        }
    }

    /// Process-wide instance, built on first use.
    pub fn global() -> &'static LookupTables {
        static TABLES: OnceLock<LookupTables> = OnceLock::new();
        TABLES.get_or_init(LookupTables::new)
    }

    /// Smallest power of two `>= value`, or `None` past the table.
    pub fn next_power(&self, value: u32) -> Option<u32> {
        self.powers_of_two.iter().copied().find(|&p| p >= value)
    }

    /// The decode table for `gamma`, as uploaded to the transfer kernel.
    pub fn decode_table(&self, gamma: crate::core::types::Gamma) -> &[f32; 256] {
        match gamma {
            crate::core::types::Gamma::Srgb => &self.srgb_decode,
            crate::core::types::Gamma::Identity => &self.norm,
        }
    }
}

impl Default for LookupTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Piecewise sRGB decode.
pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

/// Piecewise sRGB encode; the inverse of [`srgb_to_linear`].
pub fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.003_130_8 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Gamma;

    #[test]
    fn test_next_power() {
        let tables = LookupTables::new();
        assert_eq!(tables.next_power(1), Some(1));
        assert_eq!(tables.next_power(3), Some(4));
        assert_eq!(tables.next_power(512), Some(512));
        assert_eq!(tables.next_power(513), Some(1024));
        assert_eq!(tables.next_power(1 << 15), Some(1 << 15));
        assert_eq!(tables.next_power((1 << 15) + 1), None);
    }

    #[test]
    fn test_srgb_tables_invert() {
        let tables = LookupTables::global();
        for v in 0..256usize {
            let back = (linear_to_srgb(tables.srgb_decode[v]) * 255.0).round() as usize;
            assert_eq!(back, v);
        }
        assert_eq!(tables.srgb_decode[0], 0.0);
        assert!((tables.srgb_decode[255] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_table_selects_gamma() {
        let tables = LookupTables::new();
        assert_eq!(tables.decode_table(Gamma::Identity)[51], 0.2);
        assert!(tables.decode_table(Gamma::Srgb)[128] < 0.25);
    }
}
