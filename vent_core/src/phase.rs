//! Breath-cycle phases.
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BreathPhase {
    Startup = 0,
    Inspiration,
    InspirationHold,
    Expiration,
    PeepPause,
    ExpirationHold,
    ActuatorHome,
    ActuatorJog,
    Fault,
    Debug,
    Off,
}

impl BreathPhase {
    pub const ALL: [Self; 11] = [
        Self::Startup,
        Self::Inspiration,
        Self::InspirationHold,
        Self::Expiration,
        Self::PeepPause,
        Self::ExpirationHold,
        Self::ActuatorHome,
        Self::ActuatorJog,
        Self::Fault,
        Self::Debug,
        Self::Off,
    ];

    /// Stable identifier used in logs and on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Startup => "ST_STARTUP",
            Self::Inspiration => "ST_INSPR",
            Self::InspirationHold => "ST_INSPR_HOLD",
            Self::Expiration => "ST_EXPR",
            Self::PeepPause => "ST_PEEP_PAUSE",
            Self::ExpirationHold => "ST_EXPR_HOLD",
            Self::ActuatorHome => "ST_ACTUATOR_HOME",
            Self::ActuatorJog => "ST_ACTUATOR_JOG",
            Self::Fault => "ST_FAULT",
            Self::Debug => "ST_DEBUG",
            Self::Off => "ST_OFF",
        }
    }

    const fn alias(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Inspiration => "inspiration",
            Self::InspirationHold => "inspiration-hold",
            Self::Expiration => "expiration",
            Self::PeepPause => "peep-pause",
            Self::ExpirationHold => "expiration-hold",
            Self::ActuatorHome => "home",
            Self::ActuatorJog => "jog",
            Self::Fault => "fault",
            Self::Debug => "debug",
            Self::Off => "off",
        }
    }

    /// Phases of an active breath cycle.
    pub const fn is_breathing(self) -> bool {
        matches!(
            self,
            Self::Inspiration
                | Self::InspirationHold
                | Self::Expiration
                | Self::PeepPause
                | Self::ExpirationHold
        )
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(usize::from(v)).copied()
    }
}

/// Wire names of every phase, in declaration order.
pub fn phase_names() -> impl Iterator<Item = &'static str> {
    BreathPhase::ALL.iter().map(|p| p.name())
}

impl core::fmt::Display for BreathPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BreathPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s) || p.alias().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown phase '{s}'"))
    }
}

/// Result of one phase handler: where to go, and whether to run that phase's
/// entry actions on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub next: BreathPhase,
    pub on_enter: bool,
}

impl PhaseTransition {
    pub const fn stay(p: BreathPhase) -> Self {
        Self {
            next: p,
            on_enter: false,
        }
    }

    pub const fn to(p: BreathPhase) -> Self {
        Self {
            next: p,
            on_enter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_round_trips() {
        for p in BreathPhase::ALL {
            assert_eq!(BreathPhase::from_u8(p.as_u8()), Some(p));
        }
        assert_eq!(BreathPhase::from_u8(11), None);
    }

    #[test]
    fn parses_wire_and_human_names() {
        assert_eq!("ST_INSPR".parse::<BreathPhase>(), Ok(BreathPhase::Inspiration));
        assert_eq!("Home".parse::<BreathPhase>(), Ok(BreathPhase::ActuatorHome));
        assert!("breathe".parse::<BreathPhase>().is_err());
    }
}
