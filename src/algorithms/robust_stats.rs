/// 稳健统计量：中位数与中位数绝对偏差（MAD）

/// 计算 MAD 时默认要求的最少样本数
pub const DEFAULT_MAD_MIN_SAMPLES: usize = 4;

/// 中位数
///
/// 空输入返回 `None`；偶数个样本时取中间两个值的平均。
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        // 先求差再减半，两端都接近 f64::MAX 时也不会溢出
        Some(sorted[mid - 1] + (sorted[mid] - sorted[mid - 1]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// 中位数绝对偏差，样本数少于 4 时返回 `None`
pub fn mad(values: &[f64]) -> Option<f64> {
    mad_with_floor(values, DEFAULT_MAD_MIN_SAMPLES)
}

/// 可配置样本下限的 MAD
pub fn mad_with_floor(values: &[f64], min_samples: usize) -> Option<f64> {
    if values.len() < min_samples.max(1) {
        return None;
    }

    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_basic() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[1.0, 3.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[7.5]), Some(7.5));
    }

    #[test]
    fn test_median_near_float_max() {
        assert_eq!(median(&[f64::MAX, f64::MAX]), Some(f64::MAX));
        assert_eq!(median(&[0.0, f64::MAX]), Some(f64::MAX / 2.0));
        let m = mad(&[f64::MAX, f64::MAX, 0.0, 0.0]).unwrap();
        assert!(m.is_finite());
        assert_eq!(m, f64::MAX / 2.0);
    }

    #[test]
    fn test_mad_floor() {
        assert_eq!(mad(&[1.0, 2.0, 3.0]), None);
        assert_eq!(mad(&[1.0, 1.0, 1.0, 1.0]), Some(0.0));
    }

    #[test]
    fn test_mad_known_value() {
        // 中位数 2.5，偏差 [1.5, 0.5, 0.5, 1.5] -> 1.0
        assert_eq!(mad(&[1.0, 2.0, 3.0, 4.0]), Some(1.0));
        // 离群值不会拉大 MAD
        let with_spike = mad(&[2.0, 2.1, 1.9, 2.0, 40.0]).unwrap();
        assert!(with_spike < 0.2);
    }

    #[test]
    fn test_mad_shift_and_scale() {
        let base = [1.0, 4.0, 2.5, 7.0, 3.0, 5.5];
        let m = mad(&base).unwrap();

        let shifted: Vec<f64> = base.iter().map(|v| v + 12.5).collect();
        assert!((mad(&shifted).unwrap() - m).abs() < 1e-12);

        let scaled: Vec<f64> = base.iter().map(|v| v * 3.0).collect();
        assert!((mad(&scaled).unwrap() - 3.0 * m).abs() < 1e-12);
    }
}
