use crate::config::ZoomTuning;
use crate::session::ScanSession;
use std::time::Instant;
use tracing::{debug, trace};

/// Zoom capability reported by the active camera track, read once per session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomCapability {
    pub supported: bool,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomCapability {
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            min: 1.0,
            max: 1.0,
            step: 0.0,
        }
    }

    /// Lowest usable level; cameras reporting less than 1 still start at 1
    pub fn effective_min(&self) -> f64 {
        if self.supported && self.min.is_finite() {
            self.min.max(1.0)
        } else {
            1.0
        }
    }

    /// Maximum zoom to steer towards, falling back when the hardware
    /// reports zoom support without a usable upper bound.
    pub fn effective_max(&self, fallback: f64) -> f64 {
        if !self.supported {
            return 1.0;
        }
        if self.max.is_finite() && self.max > 0.0 {
            self.max.max(1.0)
        } else {
            fallback.max(1.0)
        }
    }
}

/// Result of recording a detection miss
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissOutcome {
    /// Inside the cooldown window of the previous counted miss
    Throttled,
    /// Counted, no zoom change due
    Counted { miss_count: u32 },
    /// Counted, and zoom should be raised to `target`
    Escalate { miss_count: u32, target: f64 },
}

/// Per-backend auto-zoom policy.
///
/// Misses are throttled to one counted miss per cooldown window so a tight
/// polling loop cannot run the zoom up. Every Nth counted miss proposes a
/// step towards the camera's maximum. The proposal is only committed once the
/// track accepts the constraint, so a rejected apply is retried at the same
/// level on the next eligible miss.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveZoom {
    tuning: ZoomTuning,
}

impl AdaptiveZoom {
    pub fn new(tuning: ZoomTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &ZoomTuning {
        &self.tuning
    }

    /// Install the capability queried right after acquisition
    pub fn configure(&self, session: &mut ScanSession, capability: &ZoomCapability) {
        session.supports_zoom = capability.supported;
        session.min_zoom = capability.effective_min();
        session.max_zoom = capability
            .effective_max(self.tuning.fallback_max_zoom)
            .max(session.min_zoom);
        session.zoom_level = session.zoom_level.clamp(session.min_zoom, session.max_zoom);
        debug!(
            "Zoom capability for {}: supported={}, range={:.1}..{:.1}",
            session.backend, session.supports_zoom, session.min_zoom, session.max_zoom
        );
    }

    /// Record a decode attempt that produced nothing
    pub fn record_miss(&self, session: &mut ScanSession, now: Instant) -> MissOutcome {
        if let Some(last) = session.last_miss_at {
            if now.saturating_duration_since(last) < self.tuning.cooldown() {
                return MissOutcome::Throttled;
            }
        }

        session.miss_count += 1;
        session.last_miss_at = Some(now);
        let miss_count = session.miss_count;
        trace!("{} counted miss #{}", session.backend, miss_count);

        if !session.supports_zoom
            || miss_count.checked_rem(self.tuning.misses_per_step) != Some(0)
            || session.zoom_level >= session.max_zoom
        {
            return MissOutcome::Counted { miss_count };
        }

        let target = (session.zoom_level + self.tuning.step)
            .clamp(session.min_zoom, session.max_zoom);
        MissOutcome::Escalate { miss_count, target }
    }

    /// Commit a zoom level the track has accepted. Never lowers the level.
    pub fn commit(&self, session: &mut ScanSession, level: f64) -> bool {
        let level = level.clamp(session.min_zoom, session.max_zoom);
        if level <= session.zoom_level {
            return false;
        }
        session.zoom_level = level;
        true
    }

    /// Back to the starting point for a fresh acquisition
    pub fn reset(&self, session: &mut ScanSession) {
        session.zoom_level = 1.0;
        session.min_zoom = 1.0;
        session.miss_count = 0;
        session.last_miss_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use std::time::Duration;

    fn tuning(cooldown_secs: u64, misses_per_step: u32) -> ZoomTuning {
        ZoomTuning {
            cooldown_ms: cooldown_secs * 1000,
            misses_per_step,
            step: 0.5,
            fallback_max_zoom: 3.0,
        }
    }

    fn zoomable_session(zoom: &AdaptiveZoom, max: f64) -> ScanSession {
        let mut session = ScanSession::new(BackendKind::Native);
        zoom.configure(
            &mut session,
            &ZoomCapability {
                supported: true,
                min: 1.0,
                max,
                step: 0.1,
            },
        );
        session
    }

    #[test]
    fn test_every_third_spaced_miss_escalates() {
        let zoom = AdaptiveZoom::new(tuning(2, 3));
        let mut session = zoomable_session(&zoom, 3.0);
        let t0 = Instant::now();

        assert_eq!(
            zoom.record_miss(&mut session, t0),
            MissOutcome::Counted { miss_count: 1 }
        );
        assert_eq!(
            zoom.record_miss(&mut session, t0 + Duration::from_secs(2)),
            MissOutcome::Counted { miss_count: 2 }
        );
        assert_eq!(
            zoom.record_miss(&mut session, t0 + Duration::from_secs(4)),
            MissOutcome::Escalate {
                miss_count: 3,
                target: 1.5
            }
        );
    }

    #[test]
    fn test_misses_inside_cooldown_collapse() {
        let zoom = AdaptiveZoom::new(tuning(2, 3));
        let mut session = zoomable_session(&zoom, 3.0);
        let t0 = Instant::now();

        zoom.record_miss(&mut session, t0);
        for offset in [100u64, 500, 1200, 1999] {
            assert_eq!(
                zoom.record_miss(&mut session, t0 + Duration::from_millis(offset)),
                MissOutcome::Throttled
            );
        }
        assert_eq!(session.miss_count, 1);
    }

    #[test]
    fn test_unsupported_zoom_never_escalates() {
        let zoom = AdaptiveZoom::new(tuning(2, 3));
        let mut session = ScanSession::new(BackendKind::Native);
        zoom.configure(&mut session, &ZoomCapability::unsupported());
        let t0 = Instant::now();

        for i in 0..10u64 {
            let outcome = zoom.record_miss(&mut session, t0 + Duration::from_secs(2 * i));
            assert!(!matches!(outcome, MissOutcome::Escalate { .. }));
        }
        assert_eq!(session.miss_count, 10);
        assert_eq!(session.zoom_level, 1.0);
    }

    #[test]
    fn test_escalation_clamps_to_max_and_stops() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = zoomable_session(&zoom, 1.8);
        let t0 = Instant::now();

        match zoom.record_miss(&mut session, t0) {
            MissOutcome::Escalate { target, .. } => {
                assert_eq!(target, 1.5);
                assert!(zoom.commit(&mut session, target));
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        match zoom.record_miss(&mut session, t0 + Duration::from_secs(1)) {
            MissOutcome::Escalate { target, .. } => {
                assert!((target - 1.8).abs() < f64::EPSILON);
                assert!(zoom.commit(&mut session, target));
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        assert_eq!(
            zoom.record_miss(&mut session, t0 + Duration::from_secs(2)),
            MissOutcome::Counted { miss_count: 3 }
        );
        assert!(session.zoom_level <= session.max_zoom);
    }

    #[test]
    fn test_uncommitted_escalation_retries_same_step() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = zoomable_session(&zoom, 3.0);
        let t0 = Instant::now();

        let first = zoom.record_miss(&mut session, t0);
        let second = zoom.record_miss(&mut session, t0 + Duration::from_secs(1));
        assert_eq!(
            first,
            MissOutcome::Escalate {
                miss_count: 1,
                target: 1.5
            }
        );
        assert_eq!(
            second,
            MissOutcome::Escalate {
                miss_count: 2,
                target: 1.5
            }
        );
    }

    #[test]
    fn test_commit_is_monotonic() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = zoomable_session(&zoom, 3.0);
        assert!(zoom.commit(&mut session, 2.0));
        assert!(!zoom.commit(&mut session, 1.5));
        assert_eq!(session.zoom_level, 2.0);
        assert!(zoom.commit(&mut session, 10.0));
        assert_eq!(session.zoom_level, 3.0);
    }

    #[test]
    fn test_effective_max_fallback() {
        let capability = ZoomCapability {
            supported: true,
            min: 1.0,
            max: 0.0,
            step: 0.1,
        };
        assert_eq!(capability.effective_max(3.0), 3.0);
        assert_eq!(ZoomCapability::unsupported().effective_max(5.0), 1.0);
    }

    #[test]
    fn test_capability_minimum_is_the_floor() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = ScanSession::new(BackendKind::Quagga);
        zoom.configure(
            &mut session,
            &ZoomCapability {
                supported: true,
                min: 2.0,
                max: 4.0,
                step: 0.1,
            },
        );
        assert_eq!(session.min_zoom, 2.0);
        assert_eq!(session.zoom_level, 2.0);

        match zoom.record_miss(&mut session, Instant::now()) {
            MissOutcome::Escalate { target, .. } => {
                assert_eq!(target, 2.5);
                assert!(zoom.commit(&mut session, target));
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        assert!(!zoom.commit(&mut session, 1.5));
        assert_eq!(session.zoom_level, 2.5);

        zoom.reset(&mut session);
        assert_eq!(session.min_zoom, 1.0);
    }

    #[test]
    fn test_minimum_below_one_starts_at_one() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = ScanSession::new(BackendKind::Native);
        zoom.configure(
            &mut session,
            &ZoomCapability {
                supported: true,
                min: 0.5,
                max: 3.0,
                step: 0.1,
            },
        );
        assert_eq!(session.min_zoom, 1.0);
        assert_eq!(session.zoom_level, 1.0);
    }

    #[test]
    fn test_zero_misses_per_step_never_escalates() {
        let zoom = AdaptiveZoom::new(tuning(1, 0));
        let mut session = zoomable_session(&zoom, 3.0);
        let t0 = Instant::now();
        for i in 0..4u64 {
            assert!(!matches!(
                zoom.record_miss(&mut session, t0 + Duration::from_secs(i)),
                MissOutcome::Escalate { .. }
            ));
        }
        assert_eq!(session.zoom_level, 1.0);
    }

    #[test]
    fn test_reset() {
        let zoom = AdaptiveZoom::new(tuning(1, 1));
        let mut session = zoomable_session(&zoom, 3.0);
        zoom.record_miss(&mut session, Instant::now());
        zoom.commit(&mut session, 2.0);
        zoom.reset(&mut session);
        assert_eq!(session.zoom_level, 1.0);
        assert_eq!(session.miss_count, 0);
        assert!(session.last_miss_at.is_none());
    }
}
