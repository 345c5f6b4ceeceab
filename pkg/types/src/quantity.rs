use anyhow::{Result, bail};

/// Parse a cluster resource quantity (`512Mi`, `1G`, `2048`, `1.5Gi`) into bytes.
///
/// Fractional results are rounded up to the next whole byte.
pub fn parse_bytes(quantity: &str) -> Result<u64> {
    let q = quantity.trim();
    if q.is_empty() {
        bail!("empty quantity");
    }

    let split = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);
    if number.is_empty() {
        bail!("quantity '{}' has no numeric part", quantity);
    }

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "m" => 1e-3,
        s if s.starts_with(['e', 'E']) => {
            let exp: i32 = s[1..]
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid exponent in quantity '{}'", quantity))?;
            10f64.powi(exp)
        }
        _ => bail!("unknown suffix '{}' in quantity '{}'", suffix, quantity),
    };

    // Integral quantities take the exact path so large byte counts keep full precision.
    if let Ok(whole) = number.parse::<u64>()
        && multiplier >= 1.0
        && multiplier.fract() == 0.0
    {
        return whole
            .checked_mul(multiplier as u64)
            .ok_or_else(|| anyhow::anyhow!("quantity '{}' overflows", quantity));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid number in quantity '{}'", quantity))?;
    Ok((value * multiplier).ceil() as u64)
}
