/// Bytes read by a motion burst.
pub const BURST_LEN: usize = 14;
/// Resolution step, in counts per inch.
pub const CPI_UNIT: u16 = 90;
pub const MAX_RESOLUTION: u8 = 0x38;
/// Resolution the sensor powers up with.
pub const DEFAULT_CPI: u16 = 1620;

const MM_PER_INCH: f32 = 25.4;
const PIXEL_SUM_SCALE: f32 = 1.76;

/// Motion along both axes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Delta<T> {
    pub dx: T,
    pub dy: T,
}

/// Sensor state captured by a single motion burst.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionBurst {
    pub motion: u8,
    pub observation: u8,
    pub dx: i16,
    pub dy: i16,
    pub dx_mm: f32,
    pub dy_mm: f32,
    pub surface_quality: u16,
    pub average_pixel: f32,
    pub maximum_pixel: u8,
    pub minimum_pixel: u8,
    pub shutter: u16,
    pub frame_period: u16,
}

impl MotionBurst {
    /// Decodes the burst bytes, in wire order.
    #[must_use]
    pub fn decode(raw: &[u8; BURST_LEN], x_cpi: u16, y_cpi: u16) -> Self {
        let dx = i16::from_le_bytes([raw[2], raw[3]]);
        let dy = i16::from_le_bytes([raw[4], raw[5]]);

        Self {
            motion: raw[0],
            observation: raw[1],
            dx,
            dy,
            dx_mm: counts_to_mm(dx, x_cpi),
            dy_mm: counts_to_mm(dy, y_cpi),
            surface_quality: u16::from(raw[6]) * 4,
            average_pixel: f32::from(raw[7]) / PIXEL_SUM_SCALE,
            maximum_pixel: raw[8],
            minimum_pixel: raw[9],
            // Upper byte comes first for these two.
            shutter: u16::from_be_bytes([raw[10], raw[11]]),
            frame_period: u16::from_be_bytes([raw[12], raw[13]]),
        }
    }

    #[inline]
    #[must_use]
    pub fn has_motion(&self) -> bool {
        self.motion & super::register::MOTION_MOT != 0
    }
}

/// Converts counts per inch to the resolution register value.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cpi_to_resolution(cpi: u16) -> u8 {
    (cpi / CPI_UNIT).clamp(1, MAX_RESOLUTION.into()) as u8
}

#[must_use]
pub fn counts_to_mm(counts: i16, cpi: u16) -> f32 {
    f32::from(counts) / f32::from(cpi.max(1)) * MM_PER_INCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpi_to_resolution() {
        assert_eq!(cpi_to_resolution(0), 1);
        assert_eq!(cpi_to_resolution(90), 1);
        assert_eq!(cpi_to_resolution(179), 1);
        assert_eq!(cpi_to_resolution(1620), 18);
        assert_eq!(cpi_to_resolution(5040), 0x38);
        assert_eq!(cpi_to_resolution(5670), 0x38);
        assert_eq!(cpi_to_resolution(10000), 0x38);
    }

    #[test]
    fn test_decode_burst() {
        let raw = [
            0x80, 0x3F, // motion, observation
            0x34, 0x12, // dx = 0x1234
            0xFE, 0xFF, // dy = -2
            25, 176, // squal, pixel sum
            200, 10, // max, min pixel
            0x01, 0x02, // shutter
            0x1F, 0xFF, // frame period
        ];

        let burst = MotionBurst::decode(&raw, 1620, 1620);

        assert!(burst.has_motion());
        assert_eq!(burst.observation, 0x3F);
        assert_eq!(burst.dx, 0x1234);
        assert_eq!(burst.dy, -2);
        assert_eq!(burst.surface_quality, 100);
        assert!((burst.average_pixel - 100.0).abs() < 1e-3);
        assert_eq!(burst.maximum_pixel, 200);
        assert_eq!(burst.minimum_pixel, 10);
        assert_eq!(burst.shutter, 0x0102);
        assert_eq!(burst.frame_period, 0x1FFF);
        assert!((burst.dy_mm - (-2.0 / 1620.0 * 25.4)).abs() < 1e-6);
    }

    #[test]
    fn test_counts_to_mm() {
        assert!((counts_to_mm(900, 900) - 25.4).abs() < 1e-4);
        assert!((counts_to_mm(-450, 900) + 12.7).abs() < 1e-4);
    }
}
