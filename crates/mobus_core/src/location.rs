//! Stops and consist locations on the line.
//!
//! The hot path works on the tagged [`Stop`]/[`Location`] variants; the
//! textual codes (`"7@0"`, `"6#1#2#5"`) exist only at serialization
//! boundaries (`Display`/`FromStr`). Trunk stations are numbered 1..=N in
//! travel direction; side stops are addressed by (anchor, branch, order).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A boarding/alighting point: a trunk station or a side-branch stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stop {
    /// Main-line station, 1-based in travel direction.
    Trunk(u16),
    /// Side-branch stop; `order` is 1..=K-1 from the anchor outwards.
    Side { anchor: u16, branch: u8, order: u8 },
}

impl Stop {
    /// Main-line station this stop hangs off (the stop itself for trunk
    /// stops, the anchor for side stops).
    pub fn main_station(&self) -> u16 {
        match *self {
            Stop::Trunk(s) => s,
            Stop::Side { anchor, .. } => anchor,
        }
    }

    pub fn is_side(&self) -> bool {
        matches!(self, Stop::Side { .. })
    }

    /// (anchor, branch, order) for side stops.
    pub fn side_parts(&self) -> Option<(u16, u8, u8)> {
        match *self {
            Stop::Side {
                anchor,
                branch,
                order,
            } => Some((anchor, branch, order)),
            Stop::Trunk(_) => None,
        }
    }
}

/// Where a consist currently is. `at_station == true` means arrived at
/// `stop` and eligible for a routing decision; `false` means running the
/// segment it entered when leaving `stop` (heading for `Progress::next`).
///
/// On side branches `stop.order == 0` denotes the anchor itself, so the
/// anchor-to-first-stop segment is `Side { order: 0, at_station: false }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub stop: Stop,
    pub at_station: bool,
}

impl Location {
    pub fn at(stop: Stop) -> Self {
        Self {
            stop,
            at_station: true,
        }
    }

    pub fn beyond(stop: Stop) -> Self {
        Self {
            stop,
            at_station: false,
        }
    }

    /// Ordering key for the per-tick step order: consists are stepped in
    /// descending key order so a follower never overtakes its predecessor
    /// within one tick. Mid-segment ranks above the stop it was left from.
    pub fn sort_key(&self) -> (u16, u8, u8, u8) {
        let moving = u8::from(!self.at_station);
        match self.stop {
            Stop::Trunk(s) => (s, 0, 0, moving),
            Stop::Side {
                anchor,
                branch,
                order,
            } => (anchor, branch, order, moving),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = if self.at_station { 0 } else { 5 };
        match self.stop {
            Stop::Trunk(s) => write!(f, "{s}@{phase}"),
            Stop::Side {
                anchor,
                branch,
                order,
            } => write!(f, "{anchor}#{branch}#{order}#{phase}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLocationError(pub String);

impl fmt::Display for ParseLocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid location code `{}`", self.0)
    }
}

impl std::error::Error for ParseLocationError {}

impl FromStr for Location {
    type Err = ParseLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseLocationError(s.to_string());
        let phase_of = |p: u8| match p {
            0 => Ok(true),
            5 => Ok(false),
            _ => Err(bad()),
        };
        if let Some((station, phase)) = s.split_once('@') {
            let station: u16 = station.parse().map_err(|_| bad())?;
            let phase: u8 = phase.parse().map_err(|_| bad())?;
            return Ok(Location {
                stop: Stop::Trunk(station),
                at_station: phase_of(phase)?,
            });
        }
        let parts: Vec<&str> = s.split('#').collect();
        if parts.len() != 4 {
            return Err(bad());
        }
        let anchor: u16 = parts[0].parse().map_err(|_| bad())?;
        let branch: u8 = parts[1].parse().map_err(|_| bad())?;
        let order: u8 = parts[2].parse().map_err(|_| bad())?;
        let phase: u8 = parts[3].parse().map_err(|_| bad())?;
        let at_station = phase_of(phase)?;
        if branch == 0 {
            if order != 0 {
                return Err(bad());
            }
            return Ok(Location {
                stop: Stop::Trunk(anchor),
                at_station,
            });
        }
        Ok(Location {
            stop: Stop::Side {
                anchor,
                branch,
                order,
            },
            at_station,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_codes_round_trip() {
        let arrived: Location = "7@0".parse().unwrap();
        assert_eq!(arrived, Location::at(Stop::Trunk(7)));
        let running: Location = "7@5".parse().unwrap();
        assert_eq!(running, Location::beyond(Stop::Trunk(7)));
        assert_eq!(running.to_string(), "7@5");
    }

    #[test]
    fn side_codes_round_trip() {
        let loc: Location = "6#1#2#0".parse().unwrap();
        assert_eq!(
            loc,
            Location::at(Stop::Side {
                anchor: 6,
                branch: 1,
                order: 2
            })
        );
        assert_eq!(loc.to_string(), "6#1#2#0");
        // trunk spelled in the four-part encoding
        let trunk: Location = "6#0#0#5".parse().unwrap();
        assert_eq!(trunk, Location::beyond(Stop::Trunk(6)));
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!("7".parse::<Location>().is_err());
        assert!("7@3".parse::<Location>().is_err());
        assert!("6#1#2".parse::<Location>().is_err());
    }

    #[test]
    fn step_order_puts_running_ahead_of_arrived() {
        let running = Location::beyond(Stop::Trunk(7));
        let arrived = Location::at(Stop::Trunk(7));
        assert!(running.sort_key() > arrived.sort_key());
        // downstream stations rank above upstream ones
        assert!(Location::at(Stop::Trunk(8)).sort_key() > running.sort_key());
    }
}
