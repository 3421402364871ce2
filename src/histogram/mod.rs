//! 1-D/2-D histogram accumulators, grounded on
//! `original_source/include/histogram.hpp`: fixed bin count over `[min,
//! max)`, `fill` silently drops out-of-range values, `reset` zeroes in
//! `O(bins)`, `to_json` mirrors the original's `{config, histo}` shape.

use serde_json::json;

#[derive(Debug, Clone)]
pub struct Histogram {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn new(bins: usize, min: f64, max: f64) -> Self {
        Self {
            bins,
            min,
            max,
            bin_width: (max - min) / bins as f64,
            counts: vec![0; bins],
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    pub fn fill(&mut self, value: f64) {
        let norm = (value - self.min) / self.bin_width;
        let bin = norm.floor();
        if bin >= 0.0 && (bin as usize) < self.bins {
            self.counts[bin as usize] += 1;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "config": {
                "bins": self.bins,
                "min": self.min,
                "max": self.max,
                "bin_width": self.bin_width,
            },
            "histo": self.counts,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Histogram2D {
    pub bins_x: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub bin_width_x: f64,
    pub bins_y: usize,
    pub min_y: f64,
    pub max_y: f64,
    pub bin_width_y: f64,
    counts: Vec<Vec<u64>>,
}

impl Histogram2D {
    pub fn new(bins_x: usize, min_x: f64, max_x: f64, bins_y: usize, min_y: f64, max_y: f64) -> Self {
        Self {
            bins_x,
            min_x,
            max_x,
            bin_width_x: (max_x - min_x) / bins_x as f64,
            bins_y,
            min_y,
            max_y,
            bin_width_y: (max_y - min_y) / bins_y as f64,
            counts: vec![vec![0; bins_y]; bins_x],
        }
    }

    pub fn reset(&mut self) {
        for row in &mut self.counts {
            row.iter_mut().for_each(|c| *c = 0);
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        let bin_x = ((x - self.min_x) / self.bin_width_x).floor();
        let bin_y = ((y - self.min_y) / self.bin_width_y).floor();
        if bin_x >= 0.0 && (bin_x as usize) < self.bins_x && bin_y >= 0.0 && (bin_y as usize) < self.bins_y {
            self.counts[bin_x as usize][bin_y as usize] += 1;
        }
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "config": {
                "bins_x": self.bins_x,
                "min_x": self.min_x,
                "max_x": self.max_x,
                "bin_width_x": self.bin_width_x,
                "bins_y": self.bins_y,
                "min_y": self.min_y,
                "max_y": self.max_y,
                "bin_width_y": self.bin_width_y,
            },
            "histo2D": self.counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_drops_out_of_range_silently() {
        let mut h = Histogram::new(10, 0.0, 100.0);
        h.fill(-1.0);
        h.fill(100.0);
        h.fill(150.0);
        assert_eq!(h.counts().iter().sum::<u64>(), 0);
    }

    #[test]
    fn fill_buckets_by_floor_division() {
        let mut h = Histogram::new(10, 0.0, 100.0);
        h.fill(5.0);
        h.fill(9.99);
        h.fill(95.0);
        assert_eq!(h.counts()[0], 2);
        assert_eq!(h.counts()[9], 1);
    }

    #[test]
    fn reset_zeroes_all_bins() {
        let mut h = Histogram::new(4, 0.0, 4.0);
        h.fill(1.0);
        h.fill(2.0);
        h.reset();
        assert!(h.counts().iter().all(|&c| c == 0));
    }

    #[test]
    fn to_json_matches_expected_shape() {
        let mut h = Histogram::new(2, 0.0, 2.0);
        h.fill(0.5);
        let value = h.to_json();
        assert_eq!(value["config"]["bins"], 2);
        assert_eq!(value["histo"], json!([1, 0]));
    }

    #[test]
    fn histogram_2d_fills_both_axes() {
        let mut h = Histogram2D::new(2, 0.0, 2.0, 2, 0.0, 2.0);
        h.fill(0.5, 1.5);
        assert_eq!(h.counts()[0][1], 1);
        h.fill(3.0, 3.0);
        assert_eq!(h.counts().iter().flatten().sum::<u64>(), 1);
    }
}
