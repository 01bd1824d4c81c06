use serde::{Deserialize, Serialize};
use std::fmt;

/// Angular width of each of the 8 compass sectors
pub const SECTOR_ANGLE: f32 = 45.0;

const HALF_SECTOR: f32 = SECTOR_ANGLE / 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardinalDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CardinalDirection {
    /// Non-north sectors in test order, with their center angles
    const SECTORS: [(f32, CardinalDirection); 7] = [
        (45.0, CardinalDirection::NorthEast),
        (90.0, CardinalDirection::East),
        (135.0, CardinalDirection::SouthEast),
        (180.0, CardinalDirection::South),
        (225.0, CardinalDirection::SouthWest),
        (270.0, CardinalDirection::West),
        (315.0, CardinalDirection::NorthWest),
    ];

    /// Sector containing `azimuth`.
    ///
    /// North is tested first and wraps across 0°; every other sector is a
    /// closed interval around its center, so a shared bound goes to the
    /// earlier sector. Values no sector claims (NaN) fall back to North.
    /// No normalization is applied: 380 and -10 both land in North.
    pub fn from_azimuth(azimuth: f32) -> Self {
        if azimuth >= 360.0 - HALF_SECTOR || azimuth < HALF_SECTOR {
            return CardinalDirection::North;
        }
        Self::SECTORS
            .iter()
            .find(|(center, _)| (center - HALF_SECTOR..=center + HALF_SECTOR).contains(&azimuth))
            .map(|(_, direction)| *direction)
            .unwrap_or(CardinalDirection::North)
    }

    pub fn label(self) -> &'static str {
        match self {
            CardinalDirection::North => "N",
            CardinalDirection::NorthEast => "NE",
            CardinalDirection::East => "E",
            CardinalDirection::SouthEast => "SE",
            CardinalDirection::South => "S",
            CardinalDirection::SouthWest => "SW",
            CardinalDirection::West => "W",
            CardinalDirection::NorthWest => "NW",
        }
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn cardinal_direction(azimuth: f32) -> &'static str {
    CardinalDirection::from_azimuth(azimuth).label()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_centers() {
        let expected = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
        for (i, label) in expected.iter().enumerate() {
            assert_eq!(cardinal_direction(i as f32 * 45.0), *label);
        }
    }

    #[test]
    fn test_north_boundaries() {
        assert_eq!(cardinal_direction(22.49), "N");
        assert_eq!(cardinal_direction(337.5), "N");
        assert_eq!(cardinal_direction(359.99), "N");
    }

    #[test]
    fn test_shared_bounds_go_to_earlier_sector() {
        assert_eq!(cardinal_direction(22.5), "NE");
        assert_eq!(cardinal_direction(67.49), "NE");
        assert_eq!(cardinal_direction(67.5), "NE");
        assert_eq!(cardinal_direction(67.51), "E");
        assert_eq!(cardinal_direction(292.5), "W");
        assert_eq!(cardinal_direction(337.49), "NW");
    }

    #[test]
    fn test_out_of_range_falls_to_north() {
        assert_eq!(cardinal_direction(380.0), "N");
        assert_eq!(cardinal_direction(-10.0), "N");
        assert_eq!(cardinal_direction(f32::NAN), "N");
        assert_eq!(cardinal_direction(f32::INFINITY), "N");
    }

    #[test]
    fn test_display_uses_label() {
        assert_eq!(CardinalDirection::SouthWest.to_string(), "SW");
    }
}
