//! Alarm conditions with bad/good hysteresis, a round-robin display and an
//! audio snooze.
//!
//! Every condition update carries a sequence number (the breath counter); a
//! repeated update with the same sequence never advances the counters, so a
//! condition evaluated on several ticks of one breath still counts once.
use std::sync::Arc;
use std::time::{Duration, Instant};

use vent_traits::Clock;

use crate::config::AlarmCfg;

/// Severity, ordered so that `max()` picks what the audio should sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlarmLevel {
    Notify,
    Emergency,
    /// The unit is shutting down.
    Off,
}

impl AlarmLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Emergency => "emergency",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmId {
    HighPressure,
    LowPressure,
    BadPlateau,
    UnmetVolume,
    NoTidalPressure,
    OverCurrent,
    MechanicalFailure,
    TurningOff,
}

impl AlarmId {
    pub const ALL: [Self; 8] = [
        Self::HighPressure,
        Self::LowPressure,
        Self::BadPlateau,
        Self::UnmetVolume,
        Self::NoTidalPressure,
        Self::OverCurrent,
        Self::MechanicalFailure,
        Self::TurningOff,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Display label, minimum bad and good observations, severity.
    const fn profile(self) -> (&'static str, u32, u32, AlarmLevel) {
        match self {
            Self::HighPressure => ("HIGH PRESSURE", 1, 2, AlarmLevel::Emergency),
            Self::LowPressure => ("LOW PRES DISCONNECT", 1, 1, AlarmLevel::Emergency),
            Self::BadPlateau => ("HIGH RESIST PRESSURE", 1, 1, AlarmLevel::Notify),
            Self::UnmetVolume => ("UNMET TIDAL VOLUME", 1, 1, AlarmLevel::Emergency),
            Self::NoTidalPressure => ("NO TIDAL PRESSURE", 2, 1, AlarmLevel::Emergency),
            Self::OverCurrent => ("OVER CURRENT FAULT", 1, 2, AlarmLevel::Emergency),
            Self::MechanicalFailure => ("MECHANICAL FAILURE", 1, 1, AlarmLevel::Emergency),
            Self::TurningOff => ("TURNING OFF", 1, 1, AlarmLevel::Off),
        }
    }
}

/// One alarm and its hysteresis state.
#[derive(Debug, Clone)]
pub struct AlarmCondition {
    pub label: &'static str,
    pub level: AlarmLevel,
    pub min_bad_to_trigger: u32,
    pub min_good_to_clear: u32,
    on: bool,
    consecutive_bad: u32,
    consecutive_good: u32,
    last_bad_seq: Option<u64>,
    last_good_seq: Option<u64>,
}

impl AlarmCondition {
    pub fn new(label: &'static str, min_bad: u32, min_good: u32, level: AlarmLevel) -> Self {
        Self {
            label,
            level,
            min_bad_to_trigger: min_bad.max(1),
            min_good_to_clear: min_good.max(1),
            on: false,
            consecutive_bad: 0,
            consecutive_good: 0,
            last_bad_seq: None,
            last_good_seq: None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    pub fn consecutive_good(&self) -> u32 {
        self.consecutive_good
    }

    /// Record one observation. Returns whether the alarm is on afterwards.
    pub fn observe(&mut self, bad: bool, seq: u64) -> bool {
        if bad {
            if self.last_bad_seq != Some(seq) {
                self.consecutive_bad = self.consecutive_bad.saturating_add(1);
                self.last_bad_seq = Some(seq);
            }
            self.consecutive_good = 0;
            if !self.on && self.consecutive_bad >= self.min_bad_to_trigger {
                self.on = true;
            }
        } else {
            if self.last_good_seq != Some(seq) {
                self.consecutive_good = self.consecutive_good.saturating_add(1);
                self.last_good_seq = Some(seq);
            }
            self.consecutive_bad = 0;
            if self.on && self.consecutive_good >= self.min_good_to_clear {
                self.on = false;
            }
        }
        self.on
    }

    pub fn reset(&mut self) {
        self.on = false;
        self.consecutive_bad = 0;
        self.consecutive_good = 0;
        self.last_bad_seq = None;
        self.last_good_seq = None;
    }
}

type SnoozeCallback = Box<dyn FnMut() + Send>;

pub struct AlarmManager {
    clock: Arc<dyn Clock + Send + Sync>,
    alarms: Vec<AlarmCondition>,
    display_time: Duration,
    snooze_time: Duration,
    snoozed_until: Option<Instant>,
    on_snooze_complete: Option<SnoozeCallback>,
}

impl core::fmt::Debug for AlarmManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlarmManager")
            .field("active", &self.active_labels())
            .field("snoozed", &self.snoozed_until.is_some())
            .finish_non_exhaustive()
    }
}

impl AlarmManager {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, cfg: &AlarmCfg) -> Self {
        let alarms = AlarmId::ALL
            .iter()
            .map(|id| {
                let (label, min_bad, min_good, level) = id.profile();
                AlarmCondition::new(label, min_bad, min_good, level)
            })
            .collect();
        Self {
            clock,
            alarms,
            display_time: cfg.display_time.max(Duration::from_millis(1)),
            snooze_time: cfg.snooze_time,
            snoozed_until: None,
            on_snooze_complete: None,
        }
    }

    pub fn set_condition(&mut self, id: AlarmId, bad: bool, seq: u64) -> bool {
        let alarm = &mut self.alarms[id.index()];
        let was_on = alarm.is_on();
        let on = alarm.observe(bad, seq);
        if on != was_on {
            if on {
                tracing::warn!(alarm = alarm.label, level = alarm.level.as_str(), seq, "alarm on");
            } else {
                tracing::info!(alarm = alarm.label, seq, "alarm cleared");
            }
        }
        on
    }

    pub fn condition(&self, id: AlarmId) -> &AlarmCondition {
        &self.alarms[id.index()]
    }

    pub fn is_on(&self, id: AlarmId) -> bool {
        self.condition(id).is_on()
    }

    pub fn active_count(&self) -> usize {
        self.alarms.iter().filter(|a| a.is_on()).count()
    }

    pub fn active_labels(&self) -> Vec<&'static str> {
        self.alarms
            .iter()
            .filter(|a| a.is_on())
            .map(|a| a.label)
            .collect()
    }

    pub fn highest_active_level(&self) -> Option<AlarmLevel> {
        self.alarms
            .iter()
            .filter(|a| a.is_on())
            .map(|a| a.level)
            .max()
    }

    /// Level the audio should sound right now; `None` while snoozed.
    pub fn audible_level(&self) -> Option<AlarmLevel> {
        if self.is_snoozed() {
            None
        } else {
            self.highest_active_level()
        }
    }

    /// Label of the active alarm to show at `now_ms`, cycling through all
    /// active alarms with one display slot each.
    pub fn display_text(&self, now_ms: u64) -> Option<&'static str> {
        let active: Vec<&AlarmCondition> = self.alarms.iter().filter(|a| a.is_on()).collect();
        let n = active.len() as u64;
        if n == 0 {
            return None;
        }
        let slot = u64::try_from(self.display_time.as_millis()).unwrap_or(u64::MAX);
        let idx = (now_ms % n.saturating_mul(slot)) / slot;
        active.get(usize::try_from(idx).ok()?).map(|a| a.label)
    }

    /// Register what to run when a snooze runs out.
    pub fn on_snooze_complete(&mut self, cb: impl FnMut() + Send + 'static) {
        self.on_snooze_complete = Some(Box::new(cb));
    }

    pub fn snooze(&mut self) {
        self.snoozed_until = Some(self.clock.now() + self.snooze_time);
        tracing::info!(secs = self.snooze_time.as_secs(), "alarm audio snoozed");
    }

    pub fn cancel_snooze(&mut self) {
        self.snoozed_until = None;
    }

    pub fn toggle_snooze(&mut self) -> bool {
        if self.is_snoozed() {
            self.cancel_snooze();
        } else {
            self.snooze();
        }
        self.is_snoozed()
    }

    pub fn is_snoozed(&self) -> bool {
        self.snoozed_until.is_some()
    }

    /// Expire the snooze when its time is up.
    pub fn update(&mut self) {
        if let Some(until) = self.snoozed_until
            && self.clock.now() >= until
        {
            self.snoozed_until = None;
            tracing::info!("alarm snooze complete");
            if let Some(cb) = self.on_snooze_complete.as_mut() {
                cb();
            }
        }
    }

    pub fn all_off(&mut self) {
        for a in &mut self.alarms {
            a.reset();
        }
    }
}
