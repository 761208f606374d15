//! Default indicator calculator
//!
//! Pure functions over a candle window (ascending time). Every indicator
//! returns `None` when the window is too short for its period.

use crate::config::IndicatorConfig;
use crate::domain::{BollingerBands, Candle, Indicators};

/// Compute the full indicator snapshot for a window
pub fn compute(candles: &[Candle], config: &IndicatorConfig) -> Indicators {
    let closes: Vec<f64> = candles.iter().map(Candle::close_f64).collect();

    let sma = config
        .sma_windows
        .iter()
        .filter_map(|w| sma(&closes, *w).map(|v| (*w, v)))
        .collect();

    Indicators {
        sma,
        rsi: rsi(&closes, config.rsi_period),
        bollinger: bollinger(&closes, config.bollinger_period, config.bollinger_k),
        atr: atr(candles, config.atr_period),
    }
}

/// Simple moving average of the last `window` values
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Wilder's RSI over `period`
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed with simple averages over the first period
    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        changes[..period].iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    for change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger bands: SMA ± k population standard deviations
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    let tail = &closes[closes.len() - period..];
    let variance = tail.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    Some(BollingerBands {
        middle,
        upper: middle + k * std_dev,
        lower: middle - k * std_dev,
    })
}

/// Wilder's average true range over `period`
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() <= period {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, c)| c.true_range(Some(candles[i - 1].close_f64())))
        .collect();

    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(value)
}
