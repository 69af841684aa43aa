// Metering helpers
//
// Pure functions of the sample data / metering reading. Nothing here feeds
// back into segment rotation or recovery.

/// Floor reported for digital silence, in dBFS
pub const SILENCE_DBFS: f32 = -160.0;

/// Readings at or below this map to level 0.0
const LEVEL_FLOOR_DBFS: f32 = -60.0;

/// RMS level of a block of samples in dBFS (0 dBFS = full scale)
pub fn rms_dbfs(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return SILENCE_DBFS;
    }

    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt() as f32;

    amp_to_dbfs(rms)
}

fn amp_to_dbfs(amp: f32) -> f32 {
    if !amp.is_finite() || amp <= 0.0 {
        SILENCE_DBFS
    } else {
        (20.0 * amp.log10()).max(SILENCE_DBFS)
    }
}

/// Map a metering reading (dBFS) onto 0.0..=1.0 for display
pub fn normalized_level(metering_dbfs: Option<f32>) -> f32 {
    match metering_dbfs {
        Some(db) if db.is_finite() => {
            ((db - LEVEL_FLOOR_DBFS) / -LEVEL_FLOOR_DBFS).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_floor() {
        assert_eq!(rms_dbfs(&[0; 160]), SILENCE_DBFS);
        assert_eq!(rms_dbfs(&[]), SILENCE_DBFS);
    }

    #[test]
    fn full_scale_is_near_zero_dbfs() {
        let db = rms_dbfs(&[i16::MAX; 160]);
        assert!(db.abs() < 0.01, "got {}", db);
    }

    #[test]
    fn normalized_level_is_clamped() {
        assert_eq!(normalized_level(None), 0.0);
        assert_eq!(normalized_level(Some(SILENCE_DBFS)), 0.0);
        assert_eq!(normalized_level(Some(0.0)), 1.0);
        assert!((normalized_level(Some(-30.0)) - 0.5).abs() < 1e-6);
        assert_eq!(normalized_level(Some(f32::NAN)), 0.0);
    }
}
