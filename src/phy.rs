//! Propagation & SINR arbitration (C4, §4.4).
//!
//! Grounded on the teacher's `signal_calculations.rs` path-loss/airtime model, but
//! replaced with the free-space line-of-sight formula spec.md §4.4 names explicitly
//! (`L(d) = (c / (4*pi*f*d))^alpha`) instead of the teacher's LoRa log-distance model.

use crate::config::Config;

/// Free-space path loss `L(d) = (c / (4*pi*f*d))^alpha`, with `L(0) = 1` (no loss
/// at zero distance, avoiding a division-by-zero singularity).
pub fn path_loss(distance_m: f64, cfg: &Config) -> f64 {
    if distance_m <= 0.0 {
        return 1.0;
    }
    let denom = 4.0 * std::f64::consts::PI * cfg.carrier_frequency * distance_m;
    (cfg.light_speed / denom).powf(cfg.path_loss_exponent)
}

/// Maximum communication range `R_max`: the distance at which
/// `P_tx * L(d) / N0` (linear, not dB) equals the linear SINR threshold.
///
/// Solving `P_tx * (c/(4*pi*f*d))^a / N0 = 10^(snr_threshold_db/10)` for `d`:
/// `d = c / (4*pi*f) * (P_tx / (N0 * 10^(snr_threshold_db/10)))^(1/a)`.
pub fn max_range(cfg: &Config) -> f64 {
    let threshold_linear = 10f64.powf(cfg.snr_threshold_db / 10.0);
    let base = cfg.light_speed / (4.0 * std::f64::consts::PI * cfg.carrier_frequency);
    let ratio = cfg.transmitting_power / (cfg.noise_power * threshold_linear);
    base * ratio.powf(1.0 / cfg.path_loss_exponent)
}

/// One candidate in-flight frame considered during SINR arbitration at a receiver.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub transmitter_id: u32,
    pub distance_m: f64,
}

/// Result of SINR arbitration over a set of frames that overlapped in time at a
/// receiver (§4.4). `winner` is `Some(transmitter_id)` of the accepted frame, or
/// `None` if no candidate cleared `SNR_THRESHOLD`. `collision` is true whenever two
/// or more frames genuinely overlapped at this receiver (§9 open question (b): this
/// increments the metrics collision counter once per receiver per reception event,
/// not once per overlapping pair).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arbitration {
    pub winner: Option<u32>,
    pub collision: bool,
}

/// SINR (dB) of `candidate` against every other frame in `candidates` whose
/// interval intersects it (interference), plus the noise floor `N0`.
///
/// `SINR_k = 10*log10( P_tx*L(d_k) / (N0 + sum_{j!=k} P_tx*L(d_j)) )`
fn sinr_db(candidate: &Candidate, interferers: &[Candidate], cfg: &Config) -> f64 {
    let signal = cfg.transmitting_power * path_loss(candidate.distance_m, cfg);
    let interference: f64 = interferers
        .iter()
        .filter(|c| c.transmitter_id != candidate.transmitter_id)
        .map(|c| cfg.transmitting_power * path_loss(c.distance_m, cfg))
        .sum();
    10.0 * ((signal / (cfg.noise_power + interference)).log10())
}

/// Arbitrate among `overlapping`, a set of candidate frames whose airtime
/// intervals all intersect at this receiver during the current reception event.
/// A single non-overlapping frame (`overlapping.len() == 1`) still goes through
/// SINR arbitration against the noise floor alone, per §4.4.
pub fn arbitrate(overlapping: &[Candidate], ttl_below_cap: impl Fn(u32) -> bool, cfg: &Config) -> Arbitration {
    let collision = overlapping.len() > 1;
    let mut best: Option<(u32, f64)> = None;
    for candidate in overlapping {
        let sinr = sinr_db(candidate, overlapping, cfg);
        if sinr <= cfg.snr_threshold_db {
            continue;
        }
        if !ttl_below_cap(candidate.transmitter_id) {
            continue;
        }
        if best.map(|(_, best_sinr)| sinr > best_sinr).unwrap_or(true) {
            best = Some((candidate.transmitter_id, sinr));
        }
    }
    Arbitration { winner: best.map(|(id, _)| id), collision }
}

/// On-air transmission duration for a frame of `length_bits` at `bit_rate` bps
/// (§4.3: "transmission duration is `length_bits / BIT_RATE`").
pub fn transmission_duration_micros(length_bits: u32, cfg: &Config) -> u64 {
    ((length_bits as f64 / cfg.bit_rate) * 1_000_000.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use approx::assert_relative_eq;

    fn test_cfg() -> Config {
        let mut cfg = Config::default_for_tests();
        cfg.path_loss_exponent = 2.0;
        cfg.light_speed = 3.0e8;
        cfg.carrier_frequency = 2.4e9;
        cfg.transmitting_power = 0.1;
        cfg.noise_power = 1e-13;
        cfg.snr_threshold_db = -2.0;
        cfg
    }

    #[test]
    fn path_loss_is_one_at_zero_distance() {
        let cfg = test_cfg();
        assert_relative_eq!(path_loss(0.0, &cfg), 1.0);
    }

    #[test]
    fn path_loss_decreases_with_distance() {
        let cfg = test_cfg();
        assert!(path_loss(100.0, &cfg) > path_loss(1000.0, &cfg));
    }

    #[test]
    fn single_candidate_clears_threshold_within_max_range() {
        let cfg = test_cfg();
        let r_max = max_range(&cfg);
        let candidate = Candidate { transmitter_id: 1, distance_m: r_max * 0.5 };
        let arb = arbitrate(&[candidate], |_| true, &cfg);
        assert_eq!(arb.winner, Some(1));
        assert!(!arb.collision);
    }

    #[test]
    fn closer_transmitter_wins_over_farther_one() {
        let cfg = test_cfg();
        let near = Candidate { transmitter_id: 1, distance_m: 50.0 };
        let far = Candidate { transmitter_id: 2, distance_m: 500.0 };
        let arb = arbitrate(&[near, far], |_| true, &cfg);
        assert_eq!(arb.winner, Some(1));
        assert!(arb.collision);
    }

    #[test]
    fn ttl_cap_excludes_a_candidate() {
        let cfg = test_cfg();
        let near = Candidate { transmitter_id: 1, distance_m: 50.0 };
        let arb = arbitrate(&[near], |_| false, &cfg);
        assert_eq!(arb.winner, None);
    }
}
